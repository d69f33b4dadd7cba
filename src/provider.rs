//! Provider capability interface.
//!
//! One `GitProvider` value is selected per user at configuration-load time
//! based on the `auth.provider` field, so the engine never compares provider
//! name strings itself. Unknown providers (or a missing access token) get the
//! null client, which fails every data operation with a distinguished
//! "provider not supported" error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::errors::ProviderError;
use crate::github::GithubProvider;
use crate::gitlab::GitlabProvider;

pub const GITHUB: &str = "github";
pub const GITLAB: &str = "gitlab";

/// Known hosting providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Github,
    Gitlab,
    Unsupported,
}

impl Provider {
    pub fn parse(name: &str) -> Self {
        match name {
            GITHUB => Provider::Github,
            GITLAB => Provider::Gitlab,
            _ => Provider::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Github => GITHUB,
            Provider::Gitlab => GITLAB,
            Provider::Unsupported => "unsupported",
        }
    }
}

/// A branch or tag name together with the commit it points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRefWithCommit {
    pub name: String,
    pub commit: String,
}

/// Repository summary returned by search and org listing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RepoSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub homepage: String,
}

/// User/organisation summary returned by user search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    pub id: String,
    pub login: String,
    /// "user" or "organization"
    pub kind: String,
}

/// Uniform capability set implemented per provider.
///
/// All listing operations paginate transparently and return the full
/// aggregated list. Network failures surface as [`ProviderError`]; callers
/// treat them as "skip this repository for this run".
#[async_trait]
pub trait GitProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Base URL of the provider's website, used to build user-facing links
    fn website_link(&self) -> String;

    fn repo_link(&self, repo: &str) -> String {
        format!("{}/{}", self.website_link(), repo)
    }

    fn tree_link(&self, repo: &str, reference: &str) -> String {
        format!("{}/tree/{}", self.repo_link(repo), reference)
    }

    fn compare_link(&self, repo: &str, old_commit: &str, new_commit: &str) -> String {
        format!(
            "{}/compare/{}...{}",
            self.repo_link(repo),
            old_commit,
            new_commit
        )
    }

    /// All branches with their current commit SHAs
    async fn branches(&self, repo: &str) -> Result<Vec<GitRefWithCommit>, ProviderError>;

    /// All tags with their current commit SHAs
    async fn tags(&self, repo: &str) -> Result<Vec<GitRefWithCommit>, ProviderError>;

    /// Branch names only; cheaper lookup used for autofill
    async fn branch_names(&self, repo: &str) -> Result<Vec<String>, ProviderError> {
        let branches = self.branches(repo).await?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    /// Default branch of the repository; also confirms existence/access
    async fn default_branch(&self, repo: &str) -> Result<String, ProviderError>;

    async fn search_repos(&self, query: &str) -> Result<Vec<RepoSummary>, ProviderError>;

    async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, ProviderError>;

    /// Whether the given account name is a user or an organisation
    async fn org_kind(&self, name: &str) -> Result<String, ProviderError>;

    /// Repositories belonging to a user/organisation, newest first
    async fn repos_for_org(&self, name: &str) -> Result<Vec<RepoSummary>, ProviderError>;
}

/// Fallback client for unknown providers or missing tokens: every data
/// operation fails predictably with `ProviderError::Unsupported`.
pub struct NullProvider {
    name: String,
}

impl NullProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn unsupported(&self) -> ProviderError {
        ProviderError::Unsupported(self.name.clone())
    }
}

#[async_trait]
impl GitProvider for NullProvider {
    fn provider(&self) -> Provider {
        Provider::Unsupported
    }

    fn website_link(&self) -> String {
        String::new()
    }

    fn repo_link(&self, _repo: &str) -> String {
        String::new()
    }

    fn tree_link(&self, _repo: &str, _reference: &str) -> String {
        String::new()
    }

    fn compare_link(&self, _repo: &str, _old: &str, _new: &str) -> String {
        String::new()
    }

    async fn branches(&self, _repo: &str) -> Result<Vec<GitRefWithCommit>, ProviderError> {
        Err(self.unsupported())
    }

    async fn tags(&self, _repo: &str) -> Result<Vec<GitRefWithCommit>, ProviderError> {
        Err(self.unsupported())
    }

    async fn default_branch(&self, _repo: &str) -> Result<String, ProviderError> {
        Err(self.unsupported())
    }

    async fn search_repos(&self, _query: &str) -> Result<Vec<RepoSummary>, ProviderError> {
        Err(self.unsupported())
    }

    async fn search_users(&self, _query: &str) -> Result<Vec<UserSummary>, ProviderError> {
        Err(self.unsupported())
    }

    async fn org_kind(&self, _name: &str) -> Result<String, ProviderError> {
        Err(self.unsupported())
    }

    async fn repos_for_org(&self, _name: &str) -> Result<Vec<RepoSummary>, ProviderError> {
        Err(self.unsupported())
    }
}

/// Select the concrete client for a provider name.
///
/// Unknown names and empty tokens both yield the null client so callers fail
/// predictably without special-casing.
pub fn client_for(
    provider: &str,
    token: &str,
    config: &AppConfig,
) -> anyhow::Result<Box<dyn GitProvider>> {
    if token.is_empty() {
        return Ok(Box::new(NullProvider::new(provider)));
    }

    match Provider::parse(provider) {
        Provider::Github => Ok(Box::new(GithubProvider::new(
            token,
            config.providers.github.clone(),
        )?)),
        Provider::Gitlab => Ok(Box::new(GitlabProvider::new(
            token,
            config.providers.gitlab.clone(),
        )?)),
        Provider::Unsupported => Ok(Box::new(NullProvider::new(provider))),
    }
}

/// First few characters of a commit SHA for compact display
pub fn short_commit(commit: &str) -> &str {
    if commit.len() > 6 {
        &commit[0..6]
    } else {
        commit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(Provider::parse("github"), Provider::Github);
        assert_eq!(Provider::parse("gitlab"), Provider::Gitlab);
        assert_eq!(Provider::parse("bitbucket"), Provider::Unsupported);
        assert_eq!(Provider::Github.as_str(), "github");
    }

    #[test]
    fn test_short_commit() {
        assert_eq!(short_commit("deadbeefcafe"), "deadbe");
        assert_eq!(short_commit("abc"), "abc");
        assert_eq!(short_commit(""), "");
    }

    #[tokio::test]
    async fn test_null_provider_fails_every_operation() {
        let null = NullProvider::new("bitbucket");

        assert!(matches!(
            null.branches("a/b").await,
            Err(ProviderError::Unsupported(_))
        ));
        assert!(matches!(
            null.tags("a/b").await,
            Err(ProviderError::Unsupported(_))
        ));
        assert!(matches!(
            null.default_branch("a/b").await,
            Err(ProviderError::Unsupported(_))
        ));
        assert!(matches!(
            null.branch_names("a/b").await,
            Err(ProviderError::Unsupported(_))
        ));
        assert!(matches!(
            null.search_repos("query").await,
            Err(ProviderError::Unsupported(_))
        ));
        assert!(matches!(
            null.search_users("query").await,
            Err(ProviderError::Unsupported(_))
        ));
        assert!(matches!(
            null.org_kind("x").await,
            Err(ProviderError::Unsupported(_))
        ));
        assert!(matches!(
            null.repos_for_org("x").await,
            Err(ProviderError::Unsupported(_))
        ));
        assert_eq!(null.repo_link("a/b"), "");
    }

    #[test]
    fn test_client_for_unknown_provider() {
        let config = AppConfig::default();
        let client = client_for("sourcehut", "some-token", &config).unwrap();
        assert_eq!(client.provider(), Provider::Unsupported);

        // a known provider without a token also gets the null client
        let client = client_for("github", "", &config).unwrap();
        assert_eq!(client.provider(), Provider::Unsupported);
    }

    #[test]
    fn test_client_for_known_providers() {
        let config = AppConfig::default();
        let client = client_for("github", "t0ken", &config).unwrap();
        assert_eq!(client.provider(), Provider::Github);
        assert_eq!(
            client.compare_link("a/b", "1111111", "2222222"),
            "https://github.com/a/b/compare/1111111...2222222"
        );

        let client = client_for("gitlab", "t0ken", &config).unwrap();
        assert_eq!(client.provider(), Provider::Gitlab);
        assert_eq!(
            client.tree_link("a/b", "main"),
            "https://gitlab.com/a/b/tree/main"
        );
    }
}
