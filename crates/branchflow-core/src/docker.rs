//! Container image capability consumed by the workflow.
//!
//! Tags passed to these methods are bare image tags (`v1.2.0-pre`); the
//! implementation owns the repository they belong to.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Registry credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

/// Commit and tree an image was built from, as embedded in the image.
///
/// Either field is `None` when the image does not carry it, e.g. images
/// built outside this workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub commit_sha: Option<String>,
    pub tree_sha: Option<String>,
}

impl ImageMetadata {
    pub fn new(commit_sha: impl Into<String>, tree_sha: impl Into<String>) -> Self {
        Self {
            commit_sha: Some(commit_sha.into()),
            tree_sha: Some(tree_sha.into()),
        }
    }

    /// Whether the image was built from content tree `tree`.
    pub fn matches_tree(&self, tree: &str) -> bool {
        self.tree_sha.as_deref() == Some(tree)
    }
}

/// A fresh image build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Checkout directory; the configured build path is relative to it.
    pub cwd: PathBuf,
    pub tag: String,
    pub commit_sha: String,
    pub tree_sha: String,
}

/// Docker Controller.
#[async_trait]
pub trait DockerController: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<()>;

    /// Pull `tag` from the registry. Returns `false` when it does not exist.
    async fn pull_image(&self, tag: &str) -> Result<bool>;

    /// Embedded metadata of the local image `tag`.
    async fn get_metadata(&self, tag: &str) -> Result<ImageMetadata>;

    async fn run_build(&self, request: &BuildRequest) -> Result<()>;

    async fn retag_image(&self, from_tag: &str, to_tag: &str) -> Result<()>;

    async fn push_image(&self, tag: &str) -> Result<()>;
}
