//! Command definitions executed by the runner.

use std::fmt;
use std::path::{Path, PathBuf};

/// A single process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Human-readable name, used in logs and errors.
    pub name: String,

    /// Executable to spawn.
    pub program: String,

    /// Arguments passed to the executable.
    pub args: Vec<String>,

    /// Working directory. Inherits the current directory when unset.
    pub cwd: Option<PathBuf>,

    /// Bytes written to the child's stdin before it is closed.
    pub stdin: Option<String>,
}

impl CommandSpec {
    /// Create a command from an executable and its arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = program.into();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let name = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            name,
            program,
            args,
            cwd: None,
            stdin: None,
        }
    }

    /// Create a command that runs `line` through `sh -c`.
    ///
    /// The command name is the line itself, so failures report exactly what
    /// the configuration said.
    pub fn shell(line: impl Into<String>) -> Self {
        let line = line.into();
        Self {
            name: line.clone(),
            program: "sh".to_string(),
            args: vec!["-c".to_string(), line],
            cwd: None,
            stdin: None,
        }
    }

    /// Run the command inside `dir`.
    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Feed `data` to the command's stdin.
    pub fn with_stdin(mut self, data: impl Into<String>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// Override the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_builds_name_from_argv() {
        let spec = CommandSpec::new("git", ["rev-parse", "HEAD"]);
        assert_eq!(spec.name, "git rev-parse HEAD");
        assert_eq!(spec.program, "git");
        assert_eq!(spec.args, vec!["rev-parse", "HEAD"]);
        assert!(spec.cwd.is_none());
    }

    #[test]
    fn test_shell_keeps_line_as_name() {
        let spec = CommandSpec::shell("npm ci && npm test");
        assert_eq!(spec.to_string(), "npm ci && npm test");
        assert_eq!(spec.program, "sh");
        assert_eq!(spec.args, vec!["-c", "npm ci && npm test"]);
    }

    #[test]
    fn test_builder_methods() {
        let spec = CommandSpec::new("docker", ["login"])
            .in_dir("/tmp")
            .with_stdin("secret")
            .named("docker login");
        assert_eq!(spec.cwd.as_deref(), Some(Path::new("/tmp")));
        assert_eq!(spec.stdin.as_deref(), Some("secret"));
        assert_eq!(spec.name, "docker login");
    }
}
