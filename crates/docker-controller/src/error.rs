//! Error types for docker-controller

use branchflow_ci::CiError;
use branchflow_core::FlowError;
use thiserror::Error;

/// Errors raised while driving the docker CLI
#[derive(Error, Debug)]
pub enum DockerError {
    /// The docker command ran and failed
    #[error("`{command}` exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// `docker image inspect` output could not be understood
    #[error("Unexpected image metadata for {image}: {reason}")]
    InvalidMetadata { image: String, reason: String },

    /// Spawning or streaming the process failed
    #[error(transparent)]
    Process(#[from] CiError),
}

impl From<DockerError> for FlowError {
    fn from(err: DockerError) -> Self {
        match err {
            // Streamed commands already carry a readable failure message.
            DockerError::Process(ci) => FlowError::Ci(ci),
            other => FlowError::Docker(other.to_string()),
        }
    }
}
