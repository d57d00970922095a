//! GitHub REST client
//!
//! One client is bound to one repository; every call is authenticated with
//! the workflow token.

use async_trait::async_trait;
use branchflow_core::{
    DeploymentRequest, ForgeController, NewPullRequest, PullRequest, ReviewState,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::ForgeError;
use crate::Result;

/// Public GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// GitHub connection settings
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// API base URL, without trailing slash
    pub api_url: String,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub name: String,
    /// Token used as bearer credential
    pub token: String,
}

impl GitHubConfig {
    /// Build a config from an `owner/name` slug.
    pub fn new(api_url: &str, repository: &str, token: &str) -> Result<Self> {
        let (owner, name) = repository
            .split_once('/')
            .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| ForgeError::InvalidRepository(repository.to_string()))?;
        Ok(GitHubConfig {
            api_url: api_url.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            token: token.to_string(),
        })
    }
}

/// [`ForgeController`] backed by the GitHub REST API
pub struct GitHubForge {
    config: GitHubConfig,
    http: reqwest::Client,
}

impl GitHubForge {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        let http = reqwest::Client::builder()
            .user_agent(format!("branchflow/{}", branchflow_core::VERSION))
            .default_headers(headers)
            .build()?;
        Ok(GitHubForge { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.config.api_url, self.config.owner, self.config.name, path
        )
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(self.url(path))
            .bearer_auth(&self.config.token)
    }

    fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> RequestBuilder {
        self.http
            .post(self.url(path))
            .bearer_auth(&self.config.token)
            .json(body)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let request = request.build()?;
        let method = request.method().to_string();
        let url = request.url().to_string();
        debug!("{method} {url}");

        let response = self.http.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::Status {
                method,
                url,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        Ok(self.execute(request).await?.json::<T>().await?)
    }
}

#[async_trait]
impl ForgeController for GitHubForge {
    async fn open_pull_request(
        &self,
        request: &NewPullRequest,
    ) -> branchflow_core::Result<PullRequest> {
        let body = json!({
            "title": request.title,
            "head": request.head,
            "base": request.base,
        });
        let pr: PullRequest = self.send(self.post("/pulls", &body)).await?;
        info!("Opened pull request #{}", pr.number);

        if !request.labels.is_empty() {
            let labels = json!({ "labels": request.labels });
            self.execute(self.post(&format!("/issues/{}/labels", pr.number), &labels))
                .await?;
        }
        Ok(pr)
    }

    async fn get_open_pull_requests(
        &self,
        branch: &str,
    ) -> branchflow_core::Result<Vec<PullRequest>> {
        let head = format!("{}:{}", self.config.owner, branch);
        let request = self.get("/pulls").query(&[
            ("state", "open"),
            ("head", head.as_str()),
            ("per_page", "100"),
        ]);
        Ok(self.send(request).await?)
    }

    async fn review_pull_request(
        &self,
        number: u64,
        body: &str,
        state: ReviewState,
    ) -> branchflow_core::Result<()> {
        let review = json!({ "body": body, "event": state });
        self.execute(self.post(&format!("/pulls/{number}/reviews"), &review))
            .await?;
        Ok(())
    }

    async fn comment_on_pull_request(&self, number: u64, body: &str) -> branchflow_core::Result<()> {
        let comment = json!({ "body": body });
        self.execute(self.post(&format!("/issues/{number}/comments"), &comment))
            .await?;
        Ok(())
    }

    async fn create_deployment(&self, request: &DeploymentRequest) -> branchflow_core::Result<()> {
        self.execute(self.post("/deployments", request)).await?;
        Ok(())
    }
}
