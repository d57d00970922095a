//! Throwaway git repositories for unit tests.

use std::path::Path;
use std::process::Command as StdCommand;

pub(crate) fn run_git(repo_dir: &Path, args: &[&str]) -> String {
    let output = StdCommand::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A work tree on branch `develop` with one commit, plus a bare `origin`.
pub(crate) struct GitFixture {
    pub origin: tempfile::TempDir,
    pub work: tempfile::TempDir,
}

impl GitFixture {
    pub fn new() -> Self {
        let origin = tempfile::tempdir().unwrap();
        run_git(origin.path(), &["init", "--bare", "--quiet"]);

        let work = tempfile::tempdir().unwrap();
        let dir = work.path();
        run_git(dir, &["init", "--quiet"]);
        run_git(dir, &["config", "user.name", "test-user"]);
        run_git(dir, &["config", "user.email", "test@example.com"]);
        run_git(dir, &["config", "commit.gpgsign", "false"]);
        run_git(dir, &["config", "tag.gpgsign", "false"]);
        run_git(dir, &["checkout", "--quiet", "-b", "develop"]);
        std::fs::write(dir.join("README"), "one\n").unwrap();
        run_git(dir, &["add", "."]);
        run_git(dir, &["commit", "--quiet", "-m", "initial"]);
        run_git(
            dir,
            &["remote", "add", "origin", origin.path().to_str().unwrap()],
        );
        run_git(dir, &["push", "--quiet", "origin", "develop"]);

        Self { origin, work }
    }

    pub fn dir(&self) -> &Path {
        self.work.path()
    }

    /// Commit `name` with `contents` on the current branch; returns the sha.
    pub fn commit_file(&self, name: &str, contents: &str) -> String {
        std::fs::write(self.dir().join(name), contents).unwrap();
        run_git(self.dir(), &["add", "."]);
        run_git(self.dir(), &["commit", "--quiet", "-m", name]);
        run_git(self.dir(), &["rev-parse", "HEAD"])
    }
}
