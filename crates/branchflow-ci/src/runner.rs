//! Process execution with live output streaming.

use crate::stage::CommandSpec;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Tracing target for forwarded child-process output.
///
/// Log formatters print events on this target verbatim.
pub const OUTPUT_TARGET: &str = "branchflow::output";

/// Errors raised while running commands.
#[derive(Debug, thiserror::Error)]
pub enum CiError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` failed with exit code {code}")]
    CommandFailed { command: String, code: i32 },
}

/// Captured result of a probe command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Command name.
    pub command: String,

    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed stdout.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Runs commands, either streaming their output into the log or capturing it.
pub struct CommandRunner;

impl CommandRunner {
    /// Run a command, forwarding each stdout/stderr line to the log as it is
    /// produced. Returns the exit code.
    pub async fn stream(spec: &CommandSpec) -> Result<i32, CiError> {
        let start = Instant::now();
        debug!(command = %spec, "Streaming command");

        let mut child = build(spec)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CiError::Spawn {
                command: spec.name.clone(),
                source,
            })?;

        feed_stdin(spec, &mut child).await?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (out, err) = tokio::join!(forward(stdout), forward(stderr));
        out.and(err).map_err(|source| CiError::Io {
            command: spec.name.clone(),
            source,
        })?;

        let status = child.wait().await.map_err(|source| CiError::Io {
            command: spec.name.clone(),
            source,
        })?;

        let exit_code = status.code().unwrap_or(-1);
        debug!(
            command = %spec,
            exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "Command finished"
        );
        Ok(exit_code)
    }

    /// Stream a command and fail unless it exits with status 0.
    pub async fn run_checked(spec: &CommandSpec) -> Result<(), CiError> {
        match Self::stream(spec).await? {
            0 => Ok(()),
            code => Err(CiError::CommandFailed {
                command: spec.name.clone(),
                code,
            }),
        }
    }

    /// Run commands one after another; the first failure aborts the rest.
    pub async fn run_all(specs: &[CommandSpec]) -> Result<(), CiError> {
        for spec in specs {
            info!("Running `{}`", spec);
            Self::run_checked(spec).await?;
        }
        Ok(())
    }

    /// Run a command to completion and capture its output.
    pub async fn capture(spec: &CommandSpec) -> Result<CommandOutput, CiError> {
        let start = Instant::now();
        debug!(command = %spec, "Running command");

        let mut child = build(spec)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CiError::Spawn {
                command: spec.name.clone(),
                source,
            })?;

        feed_stdin(spec, &mut child).await?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| CiError::Io {
                command: spec.name.clone(),
                source,
            })?;

        Ok(CommandOutput {
            command: spec.name.clone(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

fn build(spec: &CommandSpec) -> Command {
    let mut command = Command::new(&spec.program);
    command.args(&spec.args).kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    if spec.stdin.is_some() {
        command.stdin(Stdio::piped());
    } else {
        command.stdin(Stdio::null());
    }
    command
}

async fn feed_stdin(spec: &CommandSpec, child: &mut tokio::process::Child) -> Result<(), CiError> {
    let (Some(data), Some(mut stdin)) = (spec.stdin.as_ref(), child.stdin.take()) else {
        return Ok(());
    };
    stdin
        .write_all(data.as_bytes())
        .await
        .map_err(|source| CiError::Io {
            command: spec.name.clone(),
            source,
        })?;
    // Dropping the handle closes the pipe so the child sees EOF.
    drop(stdin);
    Ok(())
}

async fn forward<R>(reader: Option<R>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(());
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        info!(
            target: OUTPUT_TARGET,
            "{}",
            line.trim_end_matches(|c| c == '\n' || c == '\r')
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_success() {
        let output = CommandOutput {
            command: "true".to_string(),
            exit_code: 0,
            stdout: "  abc\n".to_string(),
            stderr: String::new(),
            duration_ms: 3,
        };
        assert!(output.success());
        assert_eq!(output.stdout_trimmed(), "abc");
    }

    #[test]
    fn test_command_failed_message_names_command_and_code() {
        let err = CiError::CommandFailed {
            command: "npm test".to_string(),
            code: 3,
        };
        assert_eq!(err.to_string(), "Command `npm test` failed with exit code 3");
    }

    #[tokio::test]
    async fn test_stream_returns_exit_code() {
        let code = CommandRunner::stream(&CommandSpec::shell("echo hello; exit 4"))
            .await
            .expect("stream failed");
        assert_eq!(code, 4);
    }

    #[tokio::test]
    async fn test_capture_collects_stdout_and_stderr() {
        let output = CommandRunner::capture(&CommandSpec::shell("echo out; echo err >&2"))
            .await
            .expect("capture failed");
        assert!(output.success());
        assert_eq!(output.stdout_trimmed(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_capture_feeds_stdin() {
        let output = CommandRunner::capture(&CommandSpec::new("cat", Vec::<String>::new()).with_stdin("piped"))
            .await
            .expect("capture failed");
        assert_eq!(output.stdout, "piped");
    }

    #[tokio::test]
    async fn test_spawn_error_for_missing_program() {
        let err = CommandRunner::stream(&CommandSpec::new(
            "branchflow-definitely-missing-binary",
            ["--version"],
        ))
        .await
        .unwrap_err();
        assert!(matches!(err, CiError::Spawn { .. }));
    }
}
