//! docker-controller: container image operations for branchflow
//!
//! Implements [`branchflow_core::DockerController`] on top of the `docker`
//! command line client.

pub mod cli;
pub mod error;

pub use cli::{is_missing_image, parse_env_metadata, DockerCli};
pub use error::DockerError;

/// Result type for docker-controller operations
pub type Result<T> = std::result::Result<T, DockerError>;
