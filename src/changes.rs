//! Change-set normalization and history.
//!
//! The engine produces raw diffs (old/new SHAs, added name lists). This
//! module turns them into the presentation-neutral structure that every
//! outbound channel consumes: links with text, href and hover title, grouped
//! per repository. The same structure is serialized to JSON for the per-run
//! history kept under the user's `diff/` directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{OrgDiff, RepoDiff};
use crate::provider::{short_commit, GitProvider};
use crate::setting::Setting;

/// Error text shown for a pinned reference that the remote no longer lists
pub const REF_NOT_FOUND: &str = "Branch Not Found";

/// A clickable unit of output: visible text, target URL, hover title
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub text: String,
    pub href: String,
    #[serde(default)]
    pub title: String,
}

impl Link {
    pub fn new(text: impl Into<String>, href: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            href: href.into(),
            title: title.into(),
        }
    }
}

/// What kind of change an entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    BranchOrTagDiff,
    PinnedCommitDiff,
    NewOrgRepository,
}

/// One logical change within a repository's change-set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub title: Link,
    pub change_kind: ChangeKind,
    pub changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub changes: Vec<Link>,
}

/// All changes observed for one repository (or organisation) in one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryChangeSet {
    pub repo: Link,
    /// True only when a real change was seen; warnings do not count
    pub changed: bool,
    pub entries: Vec<ChangeEntry>,
    pub recipient: String,
}

/// Turn raw diffs into presentation-neutral change-sets, repositories first
/// in configuration order, then organisations.
pub fn normalize(
    client: &dyn GitProvider,
    setting: &Setting,
    repo_diffs: &[RepoDiff],
    org_diffs: &[OrgDiff],
) -> Vec<RepositoryChangeSet> {
    let recipient = setting.auth.user_info();
    let mut sets = Vec::with_capacity(repo_diffs.len() + org_diffs.len());

    for diff in repo_diffs {
        sets.push(normalize_repo(client, diff, &recipient));
    }
    for diff in org_diffs {
        sets.push(normalize_org(client, diff, &recipient));
    }

    sets
}

/// True when at least one change-set carries a real change
pub fn any_changed(sets: &[RepositoryChangeSet]) -> bool {
    sets.iter().any(|set| set.changed)
}

fn normalize_repo(client: &dyn GitProvider, diff: &RepoDiff, recipient: &str) -> RepositoryChangeSet {
    let mut entries = Vec::new();
    let mut changed = false;
    let repo = &diff.repo;

    for (name, commit_diff) in &diff.references {
        let title = Link::new(name.clone(), client.tree_link(repo, name), "Branch: ");

        let entry = match (&commit_diff.old, &commit_diff.new) {
            (_, None) => ChangeEntry {
                title,
                change_kind: ChangeKind::PinnedCommitDiff,
                changed: true,
                error: Some(REF_NOT_FOUND.to_string()),
                changes: Vec::new(),
            },
            (None, Some(new)) => {
                changed = true;
                ChangeEntry {
                    title,
                    change_kind: ChangeKind::PinnedCommitDiff,
                    changed: true,
                    error: None,
                    changes: vec![Link::new(
                        "Latest Commit",
                        client.tree_link(repo, new),
                        "Next message will contain the diff.",
                    )],
                }
            }
            (Some(old), Some(new)) if old == new => ChangeEntry {
                title,
                change_kind: ChangeKind::PinnedCommitDiff,
                changed: false,
                error: None,
                changes: Vec::new(),
            },
            (Some(old), Some(new)) => {
                changed = true;
                ChangeEntry {
                    title,
                    change_kind: ChangeKind::PinnedCommitDiff,
                    changed: true,
                    error: None,
                    changes: vec![Link::new(
                        format!("{}..{}", short_commit(old), short_commit(new)),
                        client.compare_link(repo, old, new),
                        "Code Diff: ",
                    )],
                }
            }
        };
        entries.push(entry);
    }

    for list in &diff.ref_lists {
        let has_new = !list.added.is_empty();
        changed |= has_new;

        entries.push(ChangeEntry {
            title: Link::new(
                list.kind.title(),
                format!("{}/{}", client.repo_link(repo), list.kind.slug()),
                format!("New {}: ", list.kind.title()),
            ),
            change_kind: ChangeKind::BranchOrTagDiff,
            changed: has_new,
            error: None,
            changes: list
                .added
                .iter()
                .map(|name| Link::new(name.clone(), client.tree_link(repo, name), ""))
                .collect(),
        });
    }

    for error in &diff.fetch_errors {
        entries.push(ChangeEntry {
            title: Link::new("Fetch Error", client.repo_link(repo), ""),
            change_kind: ChangeKind::BranchOrTagDiff,
            changed: false,
            error: Some(error.clone()),
            changes: Vec::new(),
        });
    }

    RepositoryChangeSet {
        repo: Link::new(repo.clone(), client.repo_link(repo), ""),
        changed,
        entries,
        recipient: recipient.to_string(),
    }
}

fn normalize_org(client: &dyn GitProvider, diff: &OrgDiff, recipient: &str) -> RepositoryChangeSet {
    let mut entries = Vec::new();
    let mut changed = false;
    let org = &diff.org;

    if let Some(error) = &diff.fetch_error {
        entries.push(ChangeEntry {
            title: Link::new("Fetch Error", client.repo_link(org), ""),
            change_kind: ChangeKind::NewOrgRepository,
            changed: false,
            error: Some(error.clone()),
            changes: Vec::new(),
        });
    } else {
        let has_new = !diff.added.is_empty();
        changed = has_new;

        entries.push(ChangeEntry {
            title: Link::new("Repositories", client.repo_link(org), "New Repositories: "),
            change_kind: ChangeKind::NewOrgRepository,
            changed: has_new,
            error: None,
            changes: diff
                .added
                .iter()
                .map(|summary| {
                    let full_name = format!("{}/{}", org, summary.name);
                    Link::new(
                        summary.name.clone(),
                        client.repo_link(&full_name),
                        describe_repo(&summary.description, &summary.homepage),
                    )
                })
                .collect(),
        });
    }

    RepositoryChangeSet {
        repo: Link::new(org.clone(), client.repo_link(org), ""),
        changed,
        entries,
        recipient: recipient.to_string(),
    }
}

fn describe_repo(description: &str, homepage: &str) -> String {
    match (description.is_empty(), homepage.is_empty()) {
        (false, false) => format!("{} ({})", description, homepage),
        (false, true) => description.to_string(),
        (true, false) => homepage.to_string(),
        (true, true) => String::new(),
    }
}

/// One saved run in the history directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Unix timestamp, also the file stem
    pub id: String,
    pub saved_at: DateTime<Local>,
}

impl std::fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}  {}", self.id, self.saved_at.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Persist one run's change-sets as `<dir>/<unix-ts>.json`
pub fn save_history(dir: &Path, sets: &[RepositoryChangeSet]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create history directory {}", dir.display()))?;

    let id = Local::now().timestamp();
    let path = dir.join(format!("{}.json", id));
    let body = serde_json::to_string_pretty(sets).context("Failed to serialize change-sets")?;
    fs::write(&path, body)
        .with_context(|| format!("Failed to write history file {}", path.display()))?;

    debug!("Saved run history to {}", path.display());
    Ok(path)
}

/// All saved runs, newest first. A missing directory is an empty history.
pub fn list_history(dir: &Path) -> Result<Vec<HistoryEntry>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for item in fs::read_dir(dir)
        .with_context(|| format!("Failed to read history directory {}", dir.display()))?
    {
        let path = item?.path();
        if path.extension().map(|ext| ext == "json") != Some(true) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(timestamp) = stem.parse::<i64>() else {
            continue;
        };
        if let Some(saved_at) = Local.timestamp_opt(timestamp, 0).single() {
            entries.push(HistoryEntry {
                id: stem.to_string(),
                saved_at,
            });
        }
    }

    entries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
    Ok(entries)
}

/// Load one saved run by its identifier (the file stem)
pub fn load_history(dir: &Path, id: &str) -> Result<Vec<RepositoryChangeSet>> {
    let path = dir.join(format!("{}.json", id));
    let body = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read history file {}", path.display()))?;
    serde_json::from_str(&body)
        .with_context(|| format!("Failed to parse history file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CommitDiff, RefKind, RefListDiff};
    use crate::errors::ProviderError;
    use crate::provider::{GitRefWithCommit, Provider, RepoSummary, UserSummary};
    use crate::setting::Auth;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct StubClient;

    #[async_trait]
    impl GitProvider for StubClient {
        fn provider(&self) -> Provider {
            Provider::Github
        }

        fn website_link(&self) -> String {
            "https://github.com".to_string()
        }

        async fn branches(&self, _repo: &str) -> Result<Vec<GitRefWithCommit>, ProviderError> {
            Err(ProviderError::Unsupported("stub".to_string()))
        }

        async fn tags(&self, _repo: &str) -> Result<Vec<GitRefWithCommit>, ProviderError> {
            Err(ProviderError::Unsupported("stub".to_string()))
        }

        async fn default_branch(&self, _repo: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Unsupported("stub".to_string()))
        }

        async fn search_repos(&self, _query: &str) -> Result<Vec<RepoSummary>, ProviderError> {
            Err(ProviderError::Unsupported("stub".to_string()))
        }

        async fn search_users(&self, _query: &str) -> Result<Vec<UserSummary>, ProviderError> {
            Err(ProviderError::Unsupported("stub".to_string()))
        }

        async fn org_kind(&self, _name: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Unsupported("stub".to_string()))
        }

        async fn repos_for_org(&self, _name: &str) -> Result<Vec<RepoSummary>, ProviderError> {
            Err(ProviderError::Unsupported("stub".to_string()))
        }
    }

    fn setting() -> Setting {
        Setting {
            auth: Auth {
                provider: "github".to_string(),
                username: "alice".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn reference(name: &str, old: Option<&str>, new: Option<&str>) -> (String, CommitDiff) {
        (
            name.to_string(),
            CommitDiff {
                old: old.map(str::to_string),
                new: new.map(str::to_string),
            },
        )
    }

    #[test]
    fn test_pinned_reference_matrix() {
        let diff = RepoDiff {
            repo: "org/repo".to_string(),
            references: vec![
                reference("first", None, Some("abc1234567")),
                reference("same", Some("aaa"), Some("aaa")),
                reference("moved", Some("deadbeef11"), Some("cafebabe22")),
                reference("gone", Some("oldsha"), None),
                reference("never", None, None),
            ],
            ..Default::default()
        };

        let sets = normalize(&StubClient, &setting(), &[diff], &[]);
        assert_eq!(sets.len(), 1);
        let set = &sets[0];
        assert_eq!(set.recipient, "github/alice");
        assert_eq!(set.repo.href, "https://github.com/org/repo");

        let first = &set.entries[0];
        assert!(first.changed);
        assert_eq!(first.changes[0].text, "Latest Commit");
        assert_eq!(
            first.changes[0].href,
            "https://github.com/org/repo/tree/abc1234567"
        );

        let same = &set.entries[1];
        assert!(!same.changed);
        assert!(same.changes.is_empty());

        let moved = &set.entries[2];
        assert!(moved.changed);
        assert_eq!(moved.changes[0].text, "deadbe..cafeba");
        assert_eq!(
            moved.changes[0].href,
            "https://github.com/org/repo/compare/deadbeef11...cafebabe22"
        );

        for entry in [&set.entries[3], &set.entries[4]] {
            assert!(entry.changed);
            assert_eq!(entry.error.as_deref(), Some(REF_NOT_FOUND));
            assert!(entry.changes.is_empty());
        }

        // only real movement sets the aggregate flag, not the warnings
        assert!(set.changed);
    }

    #[test]
    fn test_not_found_alone_is_not_a_change() {
        let diff = RepoDiff {
            repo: "org/repo".to_string(),
            references: vec![reference("gone", Some("oldsha"), None)],
            ..Default::default()
        };

        let sets = normalize(&StubClient, &setting(), &[diff], &[]);
        assert!(!sets[0].changed);
        assert!(!any_changed(&sets));
    }

    #[test]
    fn test_ref_list_entries() {
        let diff = RepoDiff {
            repo: "org/repo".to_string(),
            ref_lists: vec![
                RefListDiff {
                    kind: RefKind::Branches,
                    added: vec!["feature-x".to_string()],
                },
                RefListDiff {
                    kind: RefKind::Tags,
                    added: Vec::new(),
                },
            ],
            ..Default::default()
        };

        let sets = normalize(&StubClient, &setting(), &[diff], &[]);
        let set = &sets[0];
        assert!(set.changed);

        let branches = &set.entries[0];
        assert_eq!(branches.title.text, "Branches");
        assert_eq!(branches.title.href, "https://github.com/org/repo/branches");
        assert_eq!(branches.title.title, "New Branches: ");
        assert_eq!(branches.change_kind, ChangeKind::BranchOrTagDiff);
        assert!(branches.changed);
        assert_eq!(
            branches.changes[0].href,
            "https://github.com/org/repo/tree/feature-x"
        );

        let tags = &set.entries[1];
        assert_eq!(tags.title.text, "Tags");
        assert!(!tags.changed);
        assert!(tags.changes.is_empty());
    }

    #[test]
    fn test_fetch_error_entry() {
        let diff = RepoDiff {
            repo: "org/repo".to_string(),
            fetch_errors: vec!["github API error (status 500)".to_string()],
            ..Default::default()
        };

        let sets = normalize(&StubClient, &setting(), &[diff], &[]);
        let set = &sets[0];
        assert!(!set.changed);
        assert!(set.entries[0].error.is_some());
    }

    #[test]
    fn test_org_change_set() {
        let diff = OrgDiff {
            org: "some-org".to_string(),
            added: vec![RepoSummary {
                id: "1".to_string(),
                name: "shiny".to_string(),
                description: "a new thing".to_string(),
                homepage: "https://shiny.dev".to_string(),
            }],
            fetch_error: None,
        };

        let sets = normalize(&StubClient, &setting(), &[], &[diff]);
        let set = &sets[0];
        assert!(set.changed);
        let entry = &set.entries[0];
        assert_eq!(entry.change_kind, ChangeKind::NewOrgRepository);
        assert_eq!(entry.changes[0].text, "shiny");
        assert_eq!(entry.changes[0].href, "https://github.com/some-org/shiny");
        assert_eq!(entry.changes[0].title, "a new thing (https://shiny.dev)");
    }

    #[test]
    fn test_describe_repo() {
        assert_eq!(describe_repo("desc", "home"), "desc (home)");
        assert_eq!(describe_repo("desc", ""), "desc");
        assert_eq!(describe_repo("", "home"), "home");
        assert_eq!(describe_repo("", ""), "");
    }

    #[test]
    fn test_history_round_trip() {
        let dir = tempdir().expect("tempdir");
        let history_dir = dir.path().join("diff");

        let diff = RepoDiff {
            repo: "org/repo".to_string(),
            references: vec![reference("main", Some("aaa"), Some("bbb"))],
            ..Default::default()
        };
        let sets = normalize(&StubClient, &setting(), &[diff], &[]);

        let path = save_history(&history_dir, &sets).expect("save");
        assert!(path.exists());

        let listed = list_history(&history_dir).expect("list");
        assert_eq!(listed.len(), 1);

        let loaded = load_history(&history_dir, &listed[0].id).expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].repo.text, "org/repo");
        assert!(loaded[0].changed);
        assert_eq!(loaded[0].entries[0].changes[0].text, "aaa..bbb");
    }

    #[test]
    fn test_list_history_missing_dir() {
        let dir = tempdir().expect("tempdir");
        let listed = list_history(&dir.path().join("absent")).expect("list");
        assert!(listed.is_empty());
    }

    #[test]
    fn test_list_history_newest_first() {
        let dir = tempdir().expect("tempdir");
        // stems with different digit counts must still order by timestamp
        std::fs::write(dir.path().join("999.json"), "[]").unwrap();
        std::fs::write(dir.path().join("1700000000.json"), "[]").unwrap();
        std::fs::write(dir.path().join("1600000000.json"), "[]").unwrap();

        let listed = list_history(dir.path()).expect("list");
        let ids: Vec<&str> = listed.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1700000000", "1600000000", "999"]);
    }

    #[test]
    fn test_list_history_ignores_foreign_files() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(dir.path().join("not-a-ts.json"), "[]").unwrap();
        std::fs::write(dir.path().join("1700000000.json"), "[]").unwrap();

        let listed = list_history(dir.path()).expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "1700000000");
    }
}
