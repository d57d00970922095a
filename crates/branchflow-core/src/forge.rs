//! Forge capability (pull requests, reviews, deployments) consumed by the
//! workflow, plus the models it exchanges.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AutomationConfig;
use crate::error::Result;

/// Branch reference of a pull request side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub sha: Option<String>,
}

impl BranchRef {
    pub fn new(ref_name: impl Into<String>) -> Self {
        Self {
            ref_name: ref_name.into(),
            sha: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub login: String,
    #[serde(default)]
    pub id: u64,
}

/// An open pull request as reported by the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub base: BranchRef,
    pub head: BranchRef,
    pub user: Author,
}

/// Pull request to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    pub base: String,
    pub head: String,
    pub title: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Verdict of a formal review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approve,
    RequestChanges,
}

/// Deployment record request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub task: String,
    pub auto_merge: bool,
    pub required_contexts: Vec<String>,
    pub payload: serde_json::Value,
    pub environment: String,
    pub transient_environment: bool,
    pub production_environment: bool,
}

/// Forge Controller.
#[async_trait]
pub trait ForgeController: Send + Sync {
    async fn open_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest>;

    /// Open pull requests whose head is `branch`.
    async fn get_open_pull_requests(&self, branch: &str) -> Result<Vec<PullRequest>>;

    async fn review_pull_request(&self, number: u64, body: &str, state: ReviewState)
        -> Result<()>;

    async fn comment_on_pull_request(&self, number: u64, body: &str) -> Result<()>;

    async fn create_deployment(&self, request: &DeploymentRequest) -> Result<()>;
}

/// How feedback reaches a pull request's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackMode {
    /// Formal approve / request-changes review.
    Review,
    /// Plain comment; the acting token cannot review this author's PRs.
    Comment,
    /// No feedback at all.
    Skip,
}

/// Pick the feedback mode for `author`.
pub fn feedback_mode(automation: &AutomationConfig, author: &Author) -> FeedbackMode {
    if automation.ignored_authors.iter().any(|a| *a == author.login) {
        FeedbackMode::Skip
    } else if automation.comment_authors.iter().any(|a| *a == author.login) {
        FeedbackMode::Comment
    } else {
        FeedbackMode::Review
    }
}
