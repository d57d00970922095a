//! In-memory fakes for the capability traits (testing only)
//!
//! Provides `FakeDocker` and `FakeForge` that satisfy the trait contracts
//! without a docker daemon or a forge, and record every call for assertions.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::docker::{BuildRequest, Credentials, DockerController, ImageMetadata};
use crate::error::{FlowError, Result};
use crate::forge::{
    Author, BranchRef, DeploymentRequest, ForgeController, NewPullRequest, PullRequest,
    ReviewState,
};

// ---------------------------------------------------------------------------
// FakeDocker
// ---------------------------------------------------------------------------

/// A recorded docker operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerCall {
    Login { user: String },
    Pull { tag: String },
    Inspect { tag: String },
    Build { tag: String },
    Retag { from: String, to: String },
    Push { tag: String },
}

type BuildHook = Box<dyn FnMut(&BuildRequest) + Send>;

#[derive(Default)]
struct DockerState {
    registry: HashMap<String, ImageMetadata>,
    local: HashMap<String, ImageMetadata>,
    calls: Vec<DockerCall>,
}

/// Docker fake with a registry and a local image store, both keyed by tag.
#[derive(Default)]
pub struct FakeDocker {
    state: Mutex<DockerState>,
    on_build: Mutex<Option<BuildHook>>,
}

impl FakeDocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an image into the registry.
    pub fn seed(&self, tag: &str, meta: ImageMetadata) {
        let mut state = self.state.lock().unwrap();
        state.registry.insert(tag.to_string(), meta);
    }

    /// Run `hook` while a build is in progress, e.g. to simulate a racing
    /// pusher.
    pub fn on_build(&self, hook: impl FnMut(&BuildRequest) + Send + 'static) {
        *self.on_build.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<DockerCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn builds(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DockerCall::Build { tag } => Some(tag),
                _ => None,
            })
            .collect()
    }

    pub fn pushes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DockerCall::Push { tag } => Some(tag),
                _ => None,
            })
            .collect()
    }

    pub fn retags(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DockerCall::Retag { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    pub fn registry_metadata(&self, tag: &str) -> Option<ImageMetadata> {
        self.state.lock().unwrap().registry.get(tag).cloned()
    }
}

#[async_trait]
impl DockerController for FakeDocker {
    async fn login(&self, credentials: &Credentials) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DockerCall::Login {
            user: credentials.user.clone(),
        });
        Ok(())
    }

    async fn pull_image(&self, tag: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DockerCall::Pull {
            tag: tag.to_string(),
        });
        match state.registry.get(tag).cloned() {
            Some(meta) => {
                state.local.insert(tag.to_string(), meta);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_metadata(&self, tag: &str) -> Result<ImageMetadata> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DockerCall::Inspect {
            tag: tag.to_string(),
        });
        state
            .local
            .get(tag)
            .cloned()
            .ok_or_else(|| FlowError::Docker(format!("no such image: {tag}")))
    }

    async fn run_build(&self, request: &BuildRequest) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(DockerCall::Build {
                tag: request.tag.clone(),
            });
            state.local.insert(
                request.tag.clone(),
                ImageMetadata::new(&request.commit_sha, &request.tree_sha),
            );
        }
        if let Some(hook) = self.on_build.lock().unwrap().as_mut() {
            hook(request);
        }
        Ok(())
    }

    async fn retag_image(&self, from_tag: &str, to_tag: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DockerCall::Retag {
            from: from_tag.to_string(),
            to: to_tag.to_string(),
        });
        let meta = state
            .local
            .get(from_tag)
            .cloned()
            .ok_or_else(|| FlowError::Docker(format!("no such image: {from_tag}")))?;
        state.local.insert(to_tag.to_string(), meta);
        Ok(())
    }

    async fn push_image(&self, tag: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DockerCall::Push {
            tag: tag.to_string(),
        });
        let meta = state
            .local
            .get(tag)
            .cloned()
            .ok_or_else(|| FlowError::Docker(format!("no such image: {tag}")))?;
        state.registry.insert(tag.to_string(), meta);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeForge
// ---------------------------------------------------------------------------

/// A recorded review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedReview {
    pub number: u64,
    pub body: String,
    pub state: ReviewState,
}

/// A recorded comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedComment {
    pub number: u64,
    pub body: String,
}

#[derive(Debug, Default)]
struct ForgeState {
    next_number: u64,
    open: Vec<PullRequest>,
    opened: Vec<NewPullRequest>,
    reviews: Vec<RecordedReview>,
    comments: Vec<RecordedComment>,
    deployments: Vec<DeploymentRequest>,
}

/// Forge fake holding open pull requests in memory.
#[derive(Debug, Default)]
pub struct FakeForge {
    state: Mutex<ForgeState>,
}

impl FakeForge {
    /// Login used as author of pull requests opened through the trait.
    pub const BOT_LOGIN: &'static str = "github-actions[bot]";

    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open pull request from `head` into `base`; returns its
    /// number.
    pub fn add_pull_request(&self, head: &str, base: &str, author: &str) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_number += 1;
        let number = state.next_number;
        state.open.push(PullRequest {
            number,
            title: format!("{head} into {base}"),
            base: BranchRef::new(base),
            head: BranchRef::new(head),
            user: Author {
                login: author.to_string(),
                id: number,
            },
        });
        number
    }

    pub fn opened(&self) -> Vec<NewPullRequest> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn reviews(&self) -> Vec<RecordedReview> {
        self.state.lock().unwrap().reviews.clone()
    }

    pub fn comments(&self) -> Vec<RecordedComment> {
        self.state.lock().unwrap().comments.clone()
    }

    pub fn deployments(&self) -> Vec<DeploymentRequest> {
        self.state.lock().unwrap().deployments.clone()
    }
}

#[async_trait]
impl ForgeController for FakeForge {
    async fn open_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest> {
        let number = self.add_pull_request(&request.head, &request.base, Self::BOT_LOGIN);
        let mut state = self.state.lock().unwrap();
        state.opened.push(request.clone());
        state
            .open
            .iter()
            .find(|pr| pr.number == number)
            .cloned()
            .ok_or_else(|| FlowError::Forge(format!("pull request #{number} vanished")))
    }

    async fn get_open_pull_requests(&self, branch: &str) -> Result<Vec<PullRequest>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .open
            .iter()
            .filter(|pr| pr.head.ref_name == branch)
            .cloned()
            .collect())
    }

    async fn review_pull_request(
        &self,
        number: u64,
        body: &str,
        state: ReviewState,
    ) -> Result<()> {
        let mut inner = self.state.lock().unwrap();
        inner.reviews.push(RecordedReview {
            number,
            body: body.to_string(),
            state,
        });
        Ok(())
    }

    async fn comment_on_pull_request(&self, number: u64, body: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.comments.push(RecordedComment {
            number,
            body: body.to_string(),
        });
        Ok(())
    }

    async fn create_deployment(&self, request: &DeploymentRequest) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.deployments.push(request.clone());
        Ok(())
    }
}
