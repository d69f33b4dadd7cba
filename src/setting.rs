//! Per-user settings: tracked repositories/organisations, authentication,
//! notification preferences and the persisted reference-state snapshot.
//!
//! Stored as `<data_dir>/<provider>/<username>/settings.yml`. The
//! `fetched_info` map is the reference state store: an absent entry means the
//! repository or organisation has never been observed, which the engine
//! treats as a first run rather than a diff.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// A repository identifier is of the form `owner/name`
pub fn valid_repo_name(repo: &str) -> bool {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex::Regex::new(r"^[\p{L}\d_-]+/[\.\p{L}\d_-]+$").expect("repo name pattern")
    });
    re.is_match(repo)
}

/// An organisation/user identifier is a single path segment
pub fn valid_org_name(name: &str) -> bool {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN
        .get_or_init(|| regex::Regex::new(r"^[\p{L}\d_-]+$").expect("org name pattern"));
    re.is_match(name)
}

/// All the details for one user: what is tracked, how to authenticate, how to
/// notify, and what was last observed.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Setting {
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub repos: Vec<TrackedRepo>,

    #[serde(default)]
    pub orgs: Vec<TrackedOrg>,

    #[serde(default)]
    pub auth: Auth,

    #[serde(rename = "user_notification", default)]
    pub user: UserNotification,

    /// Reference state store, keyed by repository identifier or org name
    #[serde(rename = "fetched_info", default)]
    pub info: BTreeMap<String, StateEntry>,
}

/// One remote repository a user follows
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct TrackedRepo {
    pub repo: String,

    /// Named references whose individual commit SHA is tracked
    #[serde(rename = "commits", default)]
    pub named_references: Vec<String>,

    /// Report newly appeared branches
    #[serde(rename = "new_branches", default)]
    pub branches: bool,

    /// Report newly appeared tags
    #[serde(rename = "new_tags", default)]
    pub tags: bool,
}

impl fmt::Display for TrackedRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "repo: {}, references: {:?}, branches: {}, tags: {}",
            self.repo, self.named_references, self.branches, self.tags
        )
    }
}

/// A user/org whose repository list is watched for new repositories
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct TrackedOrg {
    pub name: String,

    /// "user" or "organization"
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Provider authentication obtained at login time
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Auth {
    #[serde(default)]
    pub provider: String,

    #[serde(rename = "username", default)]
    pub username: String,

    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub email: String,
}

impl Auth {
    /// Recipient tag used across change entries: `provider/username`
    pub fn user_info(&self) -> String {
        format!("{}/{}", self.provider, self.username)
    }
}

/// Notification customization and scheduling preferences.
///
/// The schedule fields (tz/hour/weekday) are carried opaquely for the
/// external scheduler; the engine itself never interprets them.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct UserNotification {
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub disabled: bool,

    #[serde(rename = "webhook_url", default)]
    pub webhook_url: String,

    #[serde(rename = "webhook_type", default)]
    pub webhook_type: String,

    #[serde(rename = "tz", default)]
    pub time_zone: String,

    #[serde(default)]
    pub hour: String,

    #[serde(default)]
    pub weekday: String,
}

/// One persisted snapshot entry: repository or organisation state
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StateEntry {
    Repo(RepoState),
    Org(OrgState),
}

impl StateEntry {
    pub fn as_repo(&self) -> Option<&RepoState> {
        match self {
            StateEntry::Repo(r) => Some(r),
            StateEntry::Org(_) => None,
        }
    }

    pub fn as_org(&self) -> Option<&OrgState> {
        match self {
            StateEntry::Org(o) => Some(o),
            StateEntry::Repo(_) => None,
        }
    }
}

/// Last observed branches, tags and per-reference commit SHAs for one repo
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct RepoState {
    #[serde(default)]
    pub branches: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// reference name -> last known commit SHA
    #[serde(default)]
    pub commits: BTreeMap<String, String>,
}

/// Last observed repository list for one tracked organisation
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct OrgState {
    #[serde(rename = "org_type", default)]
    pub kind: String,

    #[serde(default)]
    pub repos: Vec<String>,
}

impl Setting {
    /// Read settings from a file into memory
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;

        let setting: Setting = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path))?;

        Ok(setting)
    }

    /// Persist settings, creating the parent directory when missing
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize settings")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings file: {:?}", path))?;

        Ok(())
    }

    /// Email address to notify: explicit notification email wins over the
    /// one supplied by the provider at login
    pub fn notification_email(&self) -> &str {
        if self.user.email.is_empty() {
            &self.auth.email
        } else {
            &self.user.email
        }
    }

    /// Display name for the notification recipient
    pub fn notification_name(&self) -> &str {
        if self.user.name.is_empty() {
            &self.auth.name
        } else {
            &self.user.name
        }
    }

    /// Repository state entry, created on first access.
    ///
    /// An org entry under the same key is replaced; key collisions between
    /// repo identifiers (`owner/name`) and org names cannot occur.
    pub fn repo_state_mut(&mut self, repo: &str) -> &mut RepoState {
        let entry = self
            .info
            .entry(repo.to_string())
            .or_insert_with(|| StateEntry::Repo(RepoState::default()));
        if !matches!(entry, StateEntry::Repo(_)) {
            *entry = StateEntry::Repo(RepoState::default());
        }
        match entry {
            StateEntry::Repo(r) => r,
            StateEntry::Org(_) => unreachable!("repo entry replaced above"),
        }
    }

    /// Organisation state entry, created on first access
    pub fn org_state_mut(&mut self, org: &str, kind: &str) -> &mut OrgState {
        let entry = self.info.entry(org.to_string()).or_insert_with(|| {
            StateEntry::Org(OrgState {
                kind: kind.to_string(),
                repos: Vec::new(),
            })
        });
        if !matches!(entry, StateEntry::Org(_)) {
            *entry = StateEntry::Org(OrgState {
                kind: kind.to_string(),
                repos: Vec::new(),
            });
        }
        match entry {
            StateEntry::Org(o) => o,
            StateEntry::Repo(_) => unreachable!("org entry replaced above"),
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.repos.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", lines.join("\n"))
    }
}
