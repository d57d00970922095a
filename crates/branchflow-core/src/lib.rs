//! branchflow Core Library
//!
//! Branch-based release workflow for repositories on a git forge:
//! - `mode`: classify a pushed branch into a workflow [`Mode`]
//! - `git`: tag, tree and ancestry plumbing over the single remote
//! - `image`: reuse / retag / build decisions with tag postconditions
//! - `workflow`: the action runner executing one mode protocol per push
//!
//! Docker and the forge are consumed through the [`DockerController`] and
//! [`ForgeController`] traits; in-memory fakes live in [`fakes`].

pub mod config;
pub mod docker;
pub mod error;
pub mod fakes;
pub mod forge;
pub mod git;
pub mod image;
pub mod mode;
pub mod telemetry;
pub mod version;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{
    AutomationConfig, Config, DeploymentBinding, DockerConfig, RepoType, ShaNames, StagingBranch,
};
pub use docker::{BuildRequest, Credentials, DockerController, ImageMetadata};
pub use error::{FlowError, Result, VersionError};
pub use forge::{
    feedback_mode, Author, BranchRef, DeploymentRequest, FeedbackMode, ForgeController,
    NewPullRequest, PullRequest, ReviewState,
};
pub use git::{CommitRef, GitRepo};
pub use image::{ExistingImageCheck, ImageBuilder, ImageSource, TagCheck};
pub use mode::{classify, Mode};
pub use telemetry::{init_tracing, ActionsFormat, LogFormat};
pub use version::read_version;
pub use workflow::{ActionRunner, PushTarget, RunOutcome, WorkflowEvent};

/// branchflow version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
