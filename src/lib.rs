//! refwatch - Poll-based Repository Reference Watcher
//!
//! refwatch polls GitHub and GitLab on behalf of registered users, detects
//! changes in tracked branches, tags and pinned commit references, and
//! assembles a normalized change-set for notification transports.
//!
//! ## Core Features
//!
//! - **Provider Clients**: uniform capability interface over the GitHub and
//!   GitLab REST APIs, with a null fallback for unknown providers
//! - **Reconciliation Engine**: diffs current remote state against the last
//!   persisted snapshot and updates it in place
//! - **Change-Set Normalizer**: flat, transport-agnostic change entries
//! - **Configuration Management**: YAML-based settings with XDG compliance
//!
//! ## Modules
//!
//! - [`config`]: application configuration and provider endpoints
//! - [`setting`]: per-user tracked repositories and persisted reference state
//! - [`provider`]: the provider capability trait and client selection
//! - [`engine`]: the diff-and-reconciliation engine
//! - [`changes`]: change-set normalization and history

pub mod changes;
pub mod config;
pub mod engine;
pub mod errors;
pub mod github;
pub mod gitlab;
pub mod notify;
pub mod provider;
pub mod setting;

pub use changes::{ChangeEntry, ChangeKind, Link, RepositoryChangeSet};
pub use config::AppConfig;
pub use engine::{ReconcileEngine, RunReport};
pub use errors::{ProviderError, RunError};
pub use provider::{GitProvider, GitRefWithCommit, Provider};
pub use setting::Setting;
