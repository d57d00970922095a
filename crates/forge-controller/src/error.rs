//! Error types for forge-controller

use branchflow_core::FlowError;
use thiserror::Error;

/// Errors that can occur while talking to the forge API
#[derive(Error, Debug)]
pub enum ForgeError {
    /// `GITHUB_REPOSITORY`-style slug is not `owner/name`
    #[error("Invalid repository slug: {0}, expected owner/name")]
    InvalidRepository(String),

    /// Transport or decoding failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// The API answered with a non-success status
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },
}

impl From<reqwest::Error> for ForgeError {
    fn from(err: reqwest::Error) -> Self {
        ForgeError::Http(err.to_string())
    }
}

impl From<ForgeError> for FlowError {
    fn from(err: ForgeError) -> Self {
        FlowError::Forge(err.to_string())
    }
}
