//! Error taxonomy for the workflow runner.

use branchflow_ci::CiError;

/// Errors produced while reading the declared version from the manifest.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("{file} not found at {rev}")]
    MissingFile { file: String, rev: String },

    #[error("{file} at {rev} is not valid JSON: {reason}")]
    InvalidJson {
        file: String,
        rev: String,
        reason: String,
    },

    #[error("{file} at {rev} does not contain a string `version` field")]
    InvalidVersionField { file: String, rev: String },
}

/// Workflow errors.
///
/// Every fatal condition of a run maps to exactly one variant so callers can
/// match on the kind instead of on message text.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Missing or invalid configuration, credentials or event wiring.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("Invalid development branch: {branch}, must be one of: {allowed}")]
    InvalidDevelopmentBranch { branch: String, allowed: String },

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("Exactly 1 remote expected in repository")]
    RemoteCount { found: usize },

    #[error("git error: {0}")]
    Git(String),

    /// A tag or image would be bound to a second content tree.
    #[error("{0}")]
    ContentMismatch(String),

    /// The tag moved on the remote while an image was being built.
    #[error("Tag has changed, aborting")]
    TagChanged { tag: String },

    /// The tag appeared on the remote while an image was being built.
    #[error("Tag {tag} has been created, aborting")]
    TagCreated { tag: String },

    #[error("The branch {branch} has no pull requests open yet, so it is not possible to run this workflow.")]
    NoPullRequest { branch: String },

    #[error("Expected exactly one open pull request for {branch}, found {count}")]
    TooManyPullRequests { branch: String, count: usize },

    /// A pull request breaks the branch policy. The same text is posted to
    /// the pull request.
    #[error("{0}")]
    PolicyViolation(String),

    #[error(transparent)]
    Ci(#[from] CiError),

    #[error("docker error: {0}")]
    Docker(String),

    #[error("forge error: {0}")]
    Forge(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowError {
    /// Whether this error was caused by a concurrent writer rather than a
    /// policy violation. Re-running the push is safe.
    pub fn is_race(&self) -> bool {
        matches!(self, FlowError::TagChanged { .. } | FlowError::TagCreated { .. })
    }

    /// Whether this is the distinguished "no pull request open yet" error.
    pub fn is_no_pull_request(&self) -> bool {
        matches!(self, FlowError::NoPullRequest { .. })
    }
}

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, FlowError>;
