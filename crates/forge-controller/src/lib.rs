//! forge-controller: GitHub integration for branchflow
//!
//! Implements [`branchflow_core::ForgeController`] against the GitHub REST
//! API: pull requests, labels, reviews, comments and deployments.

pub mod error;
pub mod github;

pub use error::ForgeError;
pub use github::{GitHubConfig, GitHubForge, DEFAULT_API_URL};

/// Result type for forge-controller operations
pub type Result<T> = std::result::Result<T, ForgeError>;
