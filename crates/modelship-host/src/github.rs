use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use modelship_core::{BranchHead, ObjectHash, RepositoryDescriptor, TreeEntry};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::host::{NewRepository, RepositoryHost};
use crate::throttle::Admission;
use crate::{HostConfig, HostError};

const API_VERSION: &str = "2022-11-28";
const ACCEPT: &str = "application/vnd.github+json";
const FALLBACK_BRANCH: &str = "main";

/// GitHub REST v3 implementation of [`RepositoryHost`].
///
/// Cheap to clone; clones share the HTTP connection pool and the resolved
/// owner login.
#[derive(Debug, Clone)]
pub struct GitHubHost {
    api_url: String,
    token: Option<String>,
    organization: Option<String>,
    client: reqwest::Client,
    owner: Arc<OnceCell<String>>,
}

impl GitHubHost {
    pub fn new(config: &HostConfig) -> Result<Self, HostError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            organization: config.organization.clone(),
            client,
            owner: Arc::new(OnceCell::new()),
        })
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}{}", self.api_url, suffix)
    }

    fn repo_endpoint(&self, repo: &RepositoryDescriptor, suffix: &str) -> String {
        self.endpoint(&format!(
            "/repos/{}/{}{}",
            urlencoding::encode(&repo.owner_login),
            urlencoding::encode(&repo.name),
            suffix
        ))
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION);

        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        builder
    }

    /// Login that owns repositories this host creates.
    async fn owner_login(&self) -> Result<String, HostError> {
        if let Some(org) = &self.organization {
            return Ok(org.clone());
        }
        let login = self
            .owner
            .get_or_try_init(|| async {
                let url = self.endpoint("/user");
                let resp = self.request(reqwest::Method::GET, url).send().await?;
                let resp = expect_success(resp, "GET /user").await?;
                let user: OwnerResponse = resp.json().await?;
                Ok::<String, HostError>(user.login)
            })
            .await?;
        Ok(login.clone())
    }
}

fn encode_branch(branch: &str) -> String {
    branch
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Map a non-2xx response onto the host error taxonomy.
async fn expect_success(
    resp: reqwest::Response,
    endpoint: &str,
) -> Result<reqwest::Response, HostError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let rate_limited = resp
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        == Some("0");
    let body = resp.text().await.unwrap_or_default();
    let detail = format!("{endpoint}: {body}");

    Err(match status.as_u16() {
        403 | 429 if rate_limited => HostError::RateLimited(detail),
        401 | 403 => HostError::Unauthorized(detail),
        422 => HostError::Conflict(detail),
        404 | 409 => HostError::NotFound(detail),
        code => HostError::Api {
            endpoint: endpoint.to_string(),
            status: code,
            body,
        },
    })
}

fn parse_hash(endpoint: &str, raw: &str) -> Result<ObjectHash, HostError> {
    ObjectHash::from_hex(raw).map_err(|e| HostError::InvalidResponse {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Serde types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OwnerResponse {
    login: String,
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
    auto_init: bool,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    name: String,
    full_name: String,
    html_url: String,
    default_branch: Option<String>,
    owner: OwnerResponse,
}

impl From<RepoResponse> for RepositoryDescriptor {
    fn from(resp: RepoResponse) -> Self {
        Self {
            name: resp.name,
            owner_login: resp.owner.login,
            default_branch: resp
                .default_branch
                .unwrap_or_else(|| FALLBACK_BRANCH.to_string()),
            html_url: resp.html_url,
            full_name: resp.full_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[derive(Debug, Deserialize)]
struct BranchCommit {
    sha: String,
    commit: BranchCommitDetail,
}

#[derive(Debug, Deserialize)]
struct BranchCommitDetail {
    tree: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Debug, Serialize)]
struct CreateBlobRequest {
    content: String,
    encoding: &'static str,
}

#[derive(Debug, Serialize)]
struct TreeItem<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: Vec<TreeItem<'a>>,
}

#[derive(Debug, Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

// ---------------------------------------------------------------------------
// RepositoryHost impl
// ---------------------------------------------------------------------------

#[async_trait]
impl RepositoryHost for GitHubHost {
    fn bounded(self: Arc<Self>, _admission: Admission) -> Arc<dyn RepositoryHost> {
        self
    }

    async fn create_repository(
        &self,
        request: &NewRepository,
    ) -> Result<RepositoryDescriptor, HostError> {
        let (url, endpoint) = match &self.organization {
            Some(org) => (
                self.endpoint(&format!("/orgs/{}/repos", urlencoding::encode(org))),
                "POST /orgs/{org}/repos",
            ),
            None => (self.endpoint("/user/repos"), "POST /user/repos"),
        };
        let payload = CreateRepoRequest {
            name: &request.name,
            description: &request.description,
            private: request.visibility.is_private(),
            auto_init: request.initialize,
        };

        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&payload)
            .send()
            .await?;
        let resp = expect_success(resp, endpoint).await?;
        let repo: RepoResponse = resp.json().await?;
        tracing::debug!(repo = %repo.full_name, "repository created");
        Ok(repo.into())
    }

    async fn get_repository(&self, name: &str) -> Result<Option<RepositoryDescriptor>, HostError> {
        let owner = self.owner_login().await?;
        let url = self.endpoint(&format!(
            "/repos/{}/{}",
            urlencoding::encode(&owner),
            urlencoding::encode(name)
        ));
        let resp = self.request(reqwest::Method::GET, url).send().await?;
        match expect_success(resp, "GET /repos/{owner}/{repo}").await {
            Ok(resp) => {
                let repo: RepoResponse = resp.json().await?;
                Ok(Some(repo.into()))
            }
            Err(HostError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn get_branch_ref(
        &self,
        repo: &RepositoryDescriptor,
        branch: &str,
    ) -> Result<BranchHead, HostError> {
        const ENDPOINT: &str = "GET /repos/{owner}/{repo}/branches/{branch}";
        let url = self.repo_endpoint(repo, &format!("/branches/{}", encode_branch(branch)));
        let resp = self.request(reqwest::Method::GET, url).send().await?;
        let resp = expect_success(resp, ENDPOINT).await?;
        let body: BranchResponse = resp.json().await?;
        Ok(BranchHead {
            commit: parse_hash(ENDPOINT, &body.commit.sha)?,
            tree: parse_hash(ENDPOINT, &body.commit.commit.tree.sha)?,
        })
    }

    async fn create_blob(
        &self,
        repo: &RepositoryDescriptor,
        content: &[u8],
    ) -> Result<ObjectHash, HostError> {
        const ENDPOINT: &str = "POST /repos/{owner}/{repo}/git/blobs";
        let url = self.repo_endpoint(repo, "/git/blobs");
        let payload = CreateBlobRequest {
            content: BASE64_STANDARD.encode(content),
            encoding: "base64",
        };
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&payload)
            .send()
            .await?;
        let resp = expect_success(resp, ENDPOINT).await?;
        let body: ShaResponse = resp.json().await?;
        parse_hash(ENDPOINT, &body.sha)
    }

    async fn create_tree(
        &self,
        repo: &RepositoryDescriptor,
        base_tree: &ObjectHash,
        entries: &[TreeEntry],
    ) -> Result<ObjectHash, HostError> {
        const ENDPOINT: &str = "POST /repos/{owner}/{repo}/git/trees";
        let url = self.repo_endpoint(repo, "/git/trees");
        let payload = CreateTreeRequest {
            base_tree: base_tree.as_str(),
            tree: entries
                .iter()
                .map(|entry| TreeItem {
                    path: &entry.path,
                    mode: entry.mode.as_git_mode(),
                    kind: entry.mode.object_type(),
                    sha: entry.hash.as_str(),
                })
                .collect(),
        };
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&payload)
            .send()
            .await?;
        let resp = expect_success(resp, ENDPOINT).await?;
        let body: ShaResponse = resp.json().await?;
        parse_hash(ENDPOINT, &body.sha)
    }

    async fn create_commit(
        &self,
        repo: &RepositoryDescriptor,
        message: &str,
        tree: &ObjectHash,
        parents: &[ObjectHash],
    ) -> Result<ObjectHash, HostError> {
        const ENDPOINT: &str = "POST /repos/{owner}/{repo}/git/commits";
        let url = self.repo_endpoint(repo, "/git/commits");
        let payload = CreateCommitRequest {
            message,
            tree: tree.as_str(),
            parents: parents.iter().map(ObjectHash::as_str).collect(),
        };
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&payload)
            .send()
            .await?;
        let resp = expect_success(resp, ENDPOINT).await?;
        let body: ShaResponse = resp.json().await?;
        parse_hash(ENDPOINT, &body.sha)
    }

    async fn update_ref(
        &self,
        repo: &RepositoryDescriptor,
        branch: &str,
        commit: &ObjectHash,
        force: bool,
    ) -> Result<(), HostError> {
        const ENDPOINT: &str = "PATCH /repos/{owner}/{repo}/git/refs/heads/{branch}";
        let url = self.repo_endpoint(repo, &format!("/git/refs/heads/{}", encode_branch(branch)));
        let payload = UpdateRefRequest {
            sha: commit.as_str(),
            force,
        };
        let resp = self
            .request(reqwest::Method::PATCH, url)
            .json(&payload)
            .send()
            .await?;
        expect_success(resp, ENDPOINT).await?;
        Ok(())
    }
}
