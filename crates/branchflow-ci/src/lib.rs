//! branchflow CI - command execution for the workflow runner
//!
//! Provides the process plumbing shared by the workflow engine and the
//! docker controller:
//! - Runs configured CI shell commands sequentially in the checkout
//! - Streams combined stdout/stderr into the log line by line
//! - Captures output of short probe commands for inspection

pub mod runner;
pub mod stage;

// Re-export key types
pub use runner::{CiError, CommandOutput, CommandRunner, OUTPUT_TARGET};
pub use stage::CommandSpec;
