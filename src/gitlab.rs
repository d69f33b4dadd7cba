//! GitLab REST API client (api/v4).
//!
//! Projects are addressed by their URL-encoded `owner/name` path. User
//! search, account-kind lookup and org repository listing are not available
//! through this client and return `ProviderError::Unsupported`, matching the
//! capability gap of the upstream API integration.

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

const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// GitLab client over the v4 REST API
pub struct GitlabProvider {
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
    id: String,
}

#[derive(Deserialize)]
struct ProjectItem {
    id: u64,
    path_with_namespace: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct ProjectDetail {
    default_branch: String,
}

impl GitlabProvider {
    pub fn new(token: &str, endpoints: Endpoints) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("refwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create GitLab HTTP client")?;

        Ok(Self {
            http,
            token: token.to_string(),
            endpoints,
        })
    }

    /// Project path in URL form: `owner/name` -> `owner%2Fname`
    fn project_id(repo: &str) -> String {
        repo.replace('/', "%2F")
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| ProviderError::RequestFailed {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::Unauthorized {
                provider: "gitlab".to_string(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: "gitlab".to_string(),
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

    async fn paged_refs(
        &self,
        repo: &str,
        kind: &str,
    ) -> Result<Vec<GitRefWithCommit>, ProviderError> {
        let mut refs = Vec::new();

        for page in 1..=MAX_PAGES {
            let url = format!(
                "{}/projects/{}/repository/{}?per_page={}&page={}",
                self.endpoints.api_url,
                Self::project_id(repo),
                kind,
                PER_PAGE,
                page
            );
            let items: Vec<RefItem> = self.get_json(&url).await?;
            let count = items.len();

            refs.extend(items.into_iter().map(|item| GitRefWithCommit {
                name: item.name,
                commit: item.commit.id,
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
impl GitProvider for GitlabProvider {
    fn provider(&self) -> Provider {
        Provider::Gitlab
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
        let url = format!(
            "{}/projects/{}",
            self.endpoints.api_url,
            Self::project_id(repo)
        );
        let detail: ProjectDetail = self.get_json(&url).await?;
        Ok(detail.default_branch)
    }

    async fn search_repos(&self, query: &str) -> Result<Vec<RepoSummary>, ProviderError> {
        let url = format!("{}/projects?search={}", self.endpoints.api_url, query);
        let projects: Vec<ProjectItem> = self.get_json(&url).await?;

        Ok(projects
            .into_iter()
            .map(|project| RepoSummary {
                id: project.id.to_string(),
                name: project.path_with_namespace,
                description: project.description.unwrap_or_default(),
                homepage: String::new(),
            })
            .collect())
    }

    async fn search_users(&self, _query: &str) -> Result<Vec<UserSummary>, ProviderError> {
        Err(ProviderError::Unsupported("gitlab".to_string()))
    }

    async fn org_kind(&self, _name: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Unsupported("gitlab".to_string()))
    }

    async fn repos_for_org(&self, _name: &str) -> Result<Vec<RepoSummary>, ProviderError> {
        Err(ProviderError::Unsupported("gitlab".to_string()))
    }
}
