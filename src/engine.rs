//! Reconciliation engine.
//!
//! One run loads nothing and saves nothing by itself: the caller passes the
//! user's [`Setting`] in, the engine fetches current remote state through the
//! provider client, computes diffs against the persisted snapshot, mutates
//! the snapshot in memory and returns the normalized change-sets. Persisting
//! the mutated setting afterwards is the caller's durability boundary, so a
//! crashed or aborted run leaves the last-good state on disk.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::changes::{self, RepositoryChangeSet};
use crate::config::AppConfig;
use crate::errors::{ProviderError, RunError};
use crate::notify;
use crate::provider::{self, GitProvider, GitRefWithCommit, RepoSummary};
use crate::setting::{RepoState, Setting, TrackedOrg, TrackedRepo};

/// Consecutive 401 responses after which the token is treated as revoked
const AUTH_FAILURE_LIMIT: u32 = 2;

/// Result of one reconciliation run for one user
#[derive(Debug)]
pub struct RunReport {
    pub change_sets: Vec<RepositoryChangeSet>,
    pub any_changed: bool,
    pub duration: Duration,
}

/// Old and new commit SHA for one pinned reference.
///
/// `old == None` means the reference was never observed before; `new == None`
/// means the reference was not found in the current remote listing. The two
/// sentinels are distinct from an empty string by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitDiff {
    pub old: Option<String>,
    pub new: Option<String>,
}

impl CommitDiff {
    pub fn changed(&self) -> bool {
        self.old != self.new
    }
}

/// Which reference set a list diff covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Branches,
    Tags,
}

impl RefKind {
    pub fn title(&self) -> &'static str {
        match self {
            RefKind::Branches => "Branches",
            RefKind::Tags => "Tags",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            RefKind::Branches => "branches",
            RefKind::Tags => "tags",
        }
    }
}

/// Newly appeared branch or tag names for one repository
#[derive(Debug, Clone)]
pub struct RefListDiff {
    pub kind: RefKind,
    pub added: Vec<String>,
}

/// Raw diff for one tracked repository, before normalization
#[derive(Debug, Clone, Default)]
pub struct RepoDiff {
    pub repo: String,
    /// Pinned references in configuration order
    pub references: Vec<(String, CommitDiff)>,
    pub ref_lists: Vec<RefListDiff>,
    /// Provider errors captured for this repository; the run continues
    pub fetch_errors: Vec<String>,
}

/// Raw diff for one tracked organisation
#[derive(Debug, Clone, Default)]
pub struct OrgDiff {
    pub org: String,
    pub added: Vec<RepoSummary>,
    pub fetch_error: Option<String>,
}

/// Elements of `new` that are absent from `old` (right-only set difference).
/// Output order follows `new`; consumers must treat it as unordered.
pub fn right_only(old: &[String], new: &[String]) -> Vec<String> {
    new.iter()
        .filter(|item| !old.contains(item))
        .cloned()
        .collect()
}

/// The reconciliation engine for one user's run
pub struct ReconcileEngine {
    client: Box<dyn GitProvider>,
    webhook_integrations: Vec<String>,
}

impl ReconcileEngine {
    /// Build an engine with the provider client selected from the user's
    /// authentication record
    pub fn new(setting: &Setting, config: &AppConfig) -> anyhow::Result<Self> {
        let client = provider::client_for(&setting.auth.provider, &setting.auth.token, config)?;
        Ok(Self {
            client,
            webhook_integrations: config.webhook_integrations.clone(),
        })
    }

    /// Build an engine around an existing client (used by tests and callers
    /// that manage clients themselves)
    pub fn with_client(client: Box<dyn GitProvider>, webhook_integrations: Vec<String>) -> Self {
        Self {
            client,
            webhook_integrations,
        }
    }

    pub fn client(&self) -> &dyn GitProvider {
        self.client.as_ref()
    }

    /// Reconcile every tracked repository and organisation for one user.
    ///
    /// Safe to call repeatedly; remote state is re-fetched fresh each time.
    /// Mutates `setting.info` in place; the caller persists on success.
    pub async fn run(&self, setting: &mut Setting) -> Result<RunReport, RunError> {
        if !notify::has_notification_target(setting, &self.webhook_integrations) {
            info!(
                "Not processing {} since no valid notification target is configured",
                setting.auth.user_info()
            );
            return Err(RunError::NoNotificationTarget {
                user: setting.auth.user_info(),
            });
        }

        let start = Instant::now();
        let mut auth_failures = 0u32;

        let tracked_repos = setting.repos.clone();
        let mut repo_diffs = Vec::with_capacity(tracked_repos.len());
        for repo in &tracked_repos {
            let diff = self
                .reconcile_repo(repo, setting, &mut auth_failures)
                .await?;
            repo_diffs.push(diff);
        }

        let tracked_orgs = setting.orgs.clone();
        let mut org_diffs = Vec::with_capacity(tracked_orgs.len());
        for org in &tracked_orgs {
            let diff = self.reconcile_org(org, setting, &mut auth_failures).await?;
            org_diffs.push(diff);
        }

        let change_sets = changes::normalize(self.client.as_ref(), setting, &repo_diffs, &org_diffs);
        let any_changed = changes::any_changed(&change_sets);
        let duration = start.elapsed();

        info!(
            "Reconciled {} repos and {} orgs for {} in {:.2}s (changed: {})",
            tracked_repos.len(),
            tracked_orgs.len(),
            setting.auth.user_info(),
            duration.as_secs_f64(),
            any_changed
        );

        Ok(RunReport {
            change_sets,
            any_changed,
            duration,
        })
    }

    async fn reconcile_repo(
        &self,
        repo: &TrackedRepo,
        setting: &mut Setting,
        auth_failures: &mut u32,
    ) -> Result<RepoDiff, RunError> {
        let mut diff = RepoDiff {
            repo: repo.repo.clone(),
            ..Default::default()
        };

        if repo.branches || !repo.named_references.is_empty() {
            match self.client.branches(&repo.repo).await {
                Ok(current) => {
                    *auth_failures = 0;
                    debug!("Fetched {} branches for {}", current.len(), repo.repo);

                    if !repo.named_references.is_empty() {
                        let state = setting.repo_state_mut(&repo.repo);
                        diff.references =
                            diff_named_references(&repo.named_references, &current, state);
                    }

                    if repo.branches {
                        let names: Vec<String> =
                            current.iter().map(|r| r.name.clone()).collect();
                        let state = setting.repo_state_mut(&repo.repo);
                        let added = right_only(&state.branches, &names);
                        // snapshot replace, not accumulate
                        state.branches = names;
                        diff.ref_lists.push(RefListDiff {
                            kind: RefKind::Branches,
                            added,
                        });
                    }
                }
                Err(err) => {
                    self.track_auth_failure(&err, auth_failures)?;
                    warn!("Skipping branches for {}: {}", repo.repo, err);
                    diff.fetch_errors.push(err.to_string());
                }
            }
        }

        if repo.tags {
            match self.client.tags(&repo.repo).await {
                Ok(current) => {
                    *auth_failures = 0;
                    debug!("Fetched {} tags for {}", current.len(), repo.repo);

                    let names: Vec<String> = current.iter().map(|r| r.name.clone()).collect();
                    let state = setting.repo_state_mut(&repo.repo);
                    let added = right_only(&state.tags, &names);
                    state.tags = names;
                    diff.ref_lists.push(RefListDiff {
                        kind: RefKind::Tags,
                        added,
                    });
                }
                Err(err) => {
                    self.track_auth_failure(&err, auth_failures)?;
                    warn!("Skipping tags for {}: {}", repo.repo, err);
                    diff.fetch_errors.push(err.to_string());
                }
            }
        }

        Ok(diff)
    }

    async fn reconcile_org(
        &self,
        org: &TrackedOrg,
        setting: &mut Setting,
        auth_failures: &mut u32,
    ) -> Result<OrgDiff, RunError> {
        match self.client.repos_for_org(&org.name).await {
            Ok(current) => {
                *auth_failures = 0;
                debug!("Fetched {} repos for org {}", current.len(), org.name);

                let names: Vec<String> = current.iter().map(|r| r.name.clone()).collect();
                let state = setting.org_state_mut(&org.name, &org.kind);
                let added_names = right_only(&state.repos, &names);
                state.repos = names;

                let added = current
                    .into_iter()
                    .filter(|summary| added_names.contains(&summary.name))
                    .collect();

                Ok(OrgDiff {
                    org: org.name.clone(),
                    added,
                    fetch_error: None,
                })
            }
            Err(err) => {
                self.track_auth_failure(&err, auth_failures)?;
                warn!("Skipping org {}: {}", org.name, err);
                Ok(OrgDiff {
                    org: org.name.clone(),
                    added: Vec::new(),
                    fetch_error: Some(err.to_string()),
                })
            }
        }
    }

    fn track_auth_failure(
        &self,
        err: &ProviderError,
        auth_failures: &mut u32,
    ) -> Result<(), RunError> {
        if err.is_unauthorized() {
            *auth_failures += 1;
            if *auth_failures >= AUTH_FAILURE_LIMIT {
                return Err(RunError::AuthRevoked(*auth_failures));
            }
        }
        Ok(())
    }
}

/// Compute per-reference commit diffs and update the persisted commit map.
///
/// A reference that is missing remotely is reported with `new == None` and
/// its last-known SHA is kept: a once-valid commit is never overwritten by
/// "not found".
fn diff_named_references(
    names: &[String],
    current: &[GitRefWithCommit],
    state: &mut RepoState,
) -> Vec<(String, CommitDiff)> {
    let mut diffs = Vec::with_capacity(names.len());

    for name in names {
        let old = state.commits.get(name).cloned();
        let new = current
            .iter()
            .find(|r| &r.name == name)
            .map(|r| r.commit.clone());

        if let Some(commit) = &new {
            state.commits.insert(name.clone(), commit.clone());
        }

        diffs.push((name.clone(), CommitDiff { old, new }));
    }

    diffs
}
