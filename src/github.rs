//! GitHub REST API client.
//!
//! Plain REST over `reqwest` with bearer-token authentication. Listing
//! endpoints paginate transparently (100 items per page) up to a hard page
//! cap so a misbehaving API cannot loop forever.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Endpoints;
use crate::errors::ProviderError;
use crate::provider::{GitProvider, GitRefWithCommit, Provider, RepoSummary, UserSummary};

/// Items requested per page on listing endpoints
const PER_PAGE: usize = 100;
/// Bound on pagination so a misbehaving API cannot stall a run
const MAX_PAGES: usize = 100;
/// Per-call timeout; one slow repository must not stall a whole run
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// GitHub client over the v3 REST API
pub struct GithubProvider {
    http: reqwest::Client,
    token: String,
    endpoints: Endpoints,
}

#[derive(Deserialize)]
struct RefItem {
    name: String,
    commit: CommitItem,
}

#[derive(Deserialize)]
struct CommitItem {
    sha: String,
}

#[derive(Deserialize)]
struct RepoItem {
    name: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
}

#[derive(Deserialize)]
struct RepoDetail {
    default_branch: String,
}

#[derive(Deserialize)]
struct RepoSearchResult {
    items: Vec<RepoItem>,
}

#[derive(Deserialize)]
struct UserItem {
    id: u64,
    login: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct UserSearchResult {
    items: Vec<UserItem>,
}

impl GithubProvider {
    pub fn new(token: &str, endpoints: Endpoints) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("refwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create GitHub HTTP client")?;

        Ok(Self {
            http,
            token: token.to_string(),
            endpoints,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|source| ProviderError::RequestFailed {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::Unauthorized {
                provider: "github".to_string(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: "github".to_string(),
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|source| ProviderError::RequestFailed {
                url: url.to_string(),
                source,
            })
    }

    /// Fetch all pages of a branch/tag listing endpoint
    async fn paged_refs(
        &self,
        repo: &str,
        kind: &str,
    ) -> Result<Vec<GitRefWithCommit>, ProviderError> {
        let mut refs = Vec::new();

        for page in 1..=MAX_PAGES {
            let url = format!(
                "{}/repos/{}/{}?per_page={}&page={}",
                self.endpoints.api_url, repo, kind, PER_PAGE, page
            );
            let items: Vec<RefItem> = self.get_json(&url).await?;
            let count = items.len();

            refs.extend(items.into_iter().map(|item| GitRefWithCommit {
                name: item.name,
                commit: item.commit.sha,
            }));

            if count < PER_PAGE {
                break;
            }
            if page == MAX_PAGES {
                warn!("Reached maximum pagination limit ({} pages) for {}", MAX_PAGES, repo);
            }
        }

        Ok(refs)
    }
}

#[async_trait]
impl GitProvider for GithubProvider {
    fn provider(&self) -> Provider {
        Provider::Github
    }

    fn website_link(&self) -> String {
        self.endpoints.web_url.clone()
    }

    async fn branches(&self, repo: &str) -> Result<Vec<GitRefWithCommit>, ProviderError> {
        self.paged_refs(repo, "branches").await
    }

    async fn tags(&self, repo: &str) -> Result<Vec<GitRefWithCommit>, ProviderError> {
        self.paged_refs(repo, "tags").await
    }

    async fn default_branch(&self, repo: &str) -> Result<String, ProviderError> {
        let url = format!("{}/repos/{}", self.endpoints.api_url, repo);
        let detail: RepoDetail = self.get_json(&url).await?;
        Ok(detail.default_branch)
    }

    async fn search_repos(&self, query: &str) -> Result<Vec<RepoSummary>, ProviderError> {
        let url = format!(
            "{}/search/repositories?page=1&q={}",
            self.endpoints.api_url,
            clean_repo_query(query)
        );
        let result: RepoSearchResult = self.get_json(&url).await?;

        Ok(result
            .items
            .into_iter()
            .map(|item| RepoSummary {
                id: item.name.clone(),
                name: if item.full_name.is_empty() {
                    item.name
                } else {
                    item.full_name
                },
                description: item.description.unwrap_or_default(),
                homepage: item.homepage.unwrap_or_default(),
            })
            .collect())
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, ProviderError> {
        let url = format!("{}/search/users?q={}", self.endpoints.api_url, query);
        let result: UserSearchResult = self.get_json(&url).await?;

        Ok(result
            .items
            .into_iter()
            .map(|item| UserSummary {
                id: item.id.to_string(),
                login: item.login,
                kind: item.kind.to_lowercase(),
            })
            .collect())
    }

    async fn org_kind(&self, name: &str) -> Result<String, ProviderError> {
        #[derive(Deserialize)]
        struct Account {
            #[serde(rename = "type")]
            kind: String,
        }

        let url = format!("{}/users/{}", self.endpoints.api_url, name);
        let account: Account = self.get_json(&url).await?;
        // GitHub reports "User" / "Organization"
        Ok(account.kind.to_lowercase())
    }

    async fn repos_for_org(&self, name: &str) -> Result<Vec<RepoSummary>, ProviderError> {
        let mut repos = Vec::new();

        for page in 1..=MAX_PAGES {
            let url = format!(
                "{}/users/{}/repos?sort=created&per_page={}&page={}",
                self.endpoints.api_url, name, PER_PAGE, page
            );
            let items: Vec<RepoItem> = self.get_json(&url).await?;
            let count = items.len();

            repos.extend(items.into_iter().map(|item| RepoSummary {
                id: item.name.clone(),
                name: item.name,
                description: item.description.unwrap_or_default(),
                homepage: item.homepage.unwrap_or_default(),
            }));

            if count < PER_PAGE {
                break;
            }
            if page == MAX_PAGES {
                warn!("Reached maximum pagination limit ({} pages) for org {}", MAX_PAGES, name);
            }
        }

        Ok(repos)
    }
}

/// Turn an `owner/name` fragment into the `name+user:owner` form GitHub's
/// search endpoint expects; plain queries pass through with spaces joined.
fn clean_repo_query(query: &str) -> String {
    let query = query.trim();
    if let Some((owner, name)) = query.split_once('/') {
        if !owner.is_empty() {
            return format!("{}+user:{}", name.trim_end_matches('/'), owner);
        }
    }
    query.replace(' ', "+")
}
