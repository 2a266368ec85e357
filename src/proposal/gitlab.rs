use crate::config::GitLabConfig;
use crate::error::{ImgUpgrError, Result};
use crate::proposal::{MergeRequest, MergeRequestResponse, ProposalGateway};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// Project path of a repository URL: no scheme or host, no `.git`, no leading slash
///
/// `https://gitlab.example.com/group/sub/project.git` gives `group/sub/project`.
pub fn project_path(repo_url: &str) -> Result<String> {
    let url = Url::parse(repo_url)
        .map_err(|e| ImgUpgrError::config(format!("invalid repository URL: {}", e)))?;

    let path = url.path();
    let path = path.strip_suffix(".git").unwrap_or(path);
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return Err(ImgUpgrError::config(
            "could not extract project path from repository URL",
        ));
    }
    Ok(path.to_string())
}

/// `scheme://host[:port]` of a repository URL
pub fn api_base(repo_url: &str) -> Result<Url> {
    let url = Url::parse(repo_url)
        .map_err(|e| ImgUpgrError::config(format!("invalid repository URL: {}", e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| ImgUpgrError::config("repository URL has no host"))?;

    let base = match url.port() {
        Some(port) => format!("{}://{}:{}/", url.scheme(), host, port),
        None => format!("{}://{}/", url.scheme(), host),
    };
    Url::parse(&base).map_err(|e| ImgUpgrError::config(format!("invalid API base: {}", e)))
}

#[derive(Serialize)]
struct CreateBranchBody<'a> {
    branch: &'a str,
    #[serde(rename = "ref")]
    from_ref: &'a str,
}

#[derive(Serialize)]
struct CommitFileBody<'a> {
    branch: &'a str,
    content: &'a str,
    commit_message: &'a str,
}

/// GitLab v4 REST client scoped to one project
pub struct GitLabClient {
    http: Client,
    base: Url,
    project: String,
    token: String,
}

impl GitLabClient {
    /// Build a client from validated GitLab settings
    pub fn new(gitlab: &GitLabConfig) -> Result<Self> {
        let repo = gitlab
            .repo
            .as_deref()
            .ok_or_else(|| ImgUpgrError::config("GitLab repository URL is not set"))?;
        let token = gitlab
            .token
            .clone()
            .ok_or_else(|| ImgUpgrError::config("GitLab token is not set"))?;

        let base = api_base(repo)?;
        debug!(base = %base, "using GitLab API base URL");

        let project = match gitlab.project_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => project_path(repo)?,
        };
        debug!(project = %project, "using GitLab project");

        Self::with_base(base, project, token, DEFAULT_TIMEOUT_SECS)
    }

    /// Client against an explicit API base, for self-hosted proxies and tests
    pub fn with_base(
        base: Url,
        project: impl Into<String>,
        token: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(GitLabClient {
            http,
            base,
            project: project.into(),
            token: token.into(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// `{base}/api/v4/projects/{project}/{tail...}`, each segment percent-encoded
    pub fn endpoint(&self, tail: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ImgUpgrError::config(format!("cannot use {} as an API base", self.base)))?
            .pop_if_empty()
            .extend(["api", "v4", "projects", self.project.as_str()])
            .extend(tail);
        Ok(url)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        debug!(method = %method, url = %url, "sending GitLab request");

        let mut request = self
            .http
            .request(method, url)
            .header(TOKEN_HEADER, &self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, response).await);
        }
        Ok(response)
    }

    async fn send_json<B, T>(&self, method: Method, url: Url, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(method, url, Some(body)).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ImgUpgrError::decode(format!("error parsing response: {}", e)))
    }
}

async fn api_error(status: StatusCode, response: reqwest::Response) -> ImgUpgrError {
    let body = response
        .bytes()
        .await
        .ok()
        .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok());
    ImgUpgrError::Api {
        status: status.as_u16(),
        body,
    }
}

#[async_trait]
impl ProposalGateway for GitLabClient {
    async fn create_merge_request(&self, request: &MergeRequest) -> Result<MergeRequestResponse> {
        info!(
            source = %request.source_branch,
            target = %request.target_branch,
            title = %request.title,
            "creating merge request"
        );

        let url = self.endpoint(&["merge_requests"])?;
        let created: MergeRequestResponse = self
            .send_json(Method::POST, url, request)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to create merge request");
                e
            })?;

        info!(url = %created.web_url, "merge request created");
        Ok(created)
    }

    async fn create_branch(&self, name: &str, from_ref: &str) -> Result<()> {
        info!(branch = %name, from = %from_ref, "creating remote branch");
        let url = self.endpoint(&["repository", "branches"])?;
        let body = CreateBranchBody {
            branch: name,
            from_ref,
        };
        self.send(Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    async fn commit_file(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<()> {
        info!(file = %path, branch = %branch, "committing file");
        let url = self.endpoint(&["repository", "files", path])?;
        let body = CommitFileBody {
            branch,
            content,
            commit_message: message,
        };

        match self.send(Method::PUT, url.clone(), Some(&body)).await {
            Ok(_) => {}
            Err(e) if e.status() == Some(404) => {
                debug!(file = %path, "file not found, creating it");
                self.send(Method::POST, url, Some(&body)).await?;
            }
            Err(e) => return Err(e),
        }

        info!(file = %path, "file committed");
        Ok(())
    }

    async fn get_file(&self, branch: &str, path: &str) -> Result<String> {
        let mut url = self.endpoint(&["repository", "files", path, "raw"])?;
        url.query_pairs_mut().append_pair("ref", branch);

        let response = self.send::<()>(Method::GET, url, None).await?;
        Ok(response.text().await?)
    }
}
