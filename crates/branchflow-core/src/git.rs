//! Git plumbing for the workflow runner: tags, refs, trees and ancestry.
//!
//! All operations run `git` in the checkout owned by this invocation and talk
//! to its single remote. Every operation is idempotent and safe to retry.

use std::path::{Path, PathBuf};

use branchflow_ci::{CommandOutput, CommandRunner, CommandSpec};
use tracing::debug;

use crate::error::{FlowError, Result};

/// History depth fetched before ancestry checks in shallow clones.
pub const ANCESTRY_FETCH_DEPTH: u32 = 1000;

/// A resolved commit and its content tree.
///
/// Two references with equal `tree` are content-equivalent, whatever their
/// `sha`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRef {
    pub sha: String,
    pub tree: String,
}

impl CommitRef {
    /// Whether both commits carry the same content.
    pub fn same_tree(&self, other: &CommitRef) -> bool {
        self.tree == other.tree
    }
}

/// The checkout directory and its one remote.
#[derive(Debug, Clone)]
pub struct GitRepo {
    dir: PathBuf,
    remote: String,
}

impl GitRepo {
    /// Open the checkout at `dir`, requiring exactly one configured remote.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let output = run(&dir, &["remote"]).await?;
        if !output.success() {
            return Err(git_failure(&output));
        }
        let remotes: Vec<&str> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        match remotes.as_slice() {
            [remote] => Ok(Self {
                remote: remote.to_string(),
                dir,
            }),
            other => Err(FlowError::RemoteCount { found: other.len() }),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    async fn git(&self, args: &[&str]) -> Result<CommandOutput> {
        run(&self.dir, args).await
    }

    async fn git_ok(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args).await?;
        if !output.success() {
            return Err(git_failure(&output));
        }
        Ok(output.stdout_trimmed().to_string())
    }

    /// Name of the checked-out branch (`HEAD` when detached).
    pub async fn current_branch(&self) -> Result<String> {
        self.git_ok(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    /// Resolve `rev` to its commit sha and tree sha.
    pub async fn resolve_commit(&self, rev: &str) -> Result<CommitRef> {
        let commit = format!("{rev}^{{commit}}");
        let tree = format!("{rev}^{{tree}}");
        let stdout = self
            .git_ok(&["rev-parse", "--verify", &commit])
            .await?;
        let tree_sha = self
            .git_ok(&["rev-parse", "--verify", &tree])
            .await?;
        if stdout.is_empty() || tree_sha.is_empty() {
            return Err(FlowError::Git(format!("cannot resolve {rev}")));
        }
        Ok(CommitRef {
            sha: stdout,
            tree: tree_sha,
        })
    }

    /// Fetch `refs/tags/<tag>` from the remote into the local tag namespace.
    ///
    /// Returns `false` when the remote has no such tag. `ls-remote
    /// --exit-code` reports absence with status 2; every other failure is
    /// propagated.
    pub async fn fetch_tag(&self, tag: &str) -> Result<bool> {
        let refname = format!("refs/tags/{tag}");
        let listing = self
            .git(&["ls-remote", "--exit-code", &self.remote, &refname])
            .await?;
        match listing.exit_code {
            0 => {}
            2 => return Ok(false),
            _ => return Err(git_failure(&listing)),
        }
        // ls-remote matches patterns by suffix; insist on the exact ref.
        let exact = listing
            .stdout
            .lines()
            .any(|line| line.split_whitespace().nth(1) == Some(refname.as_str()));
        if !exact {
            return Ok(false);
        }

        let refspec = format!("{refname}:{refname}");
        self.git_ok(&["fetch", "--no-tags", &self.remote, &refspec])
            .await?;
        Ok(true)
    }

    /// Whether `refs/tags/<tag>` exists locally.
    pub async fn local_tag_exists(&self, tag: &str) -> Result<bool> {
        let refname = format!("refs/tags/{tag}");
        let output = self
            .git(&["rev-parse", "--verify", "--quiet", &refname])
            .await?;
        match output.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            _ => Err(git_failure(&output)),
        }
    }

    /// Delete the local tag ref. No-op when absent.
    pub async fn delete_local_tag(&self, tag: &str) -> Result<()> {
        if self.local_tag_exists(tag).await? {
            self.git_ok(&["tag", "--delete", tag]).await?;
        }
        Ok(())
    }

    /// Create a lightweight tag at `sha`.
    pub async fn create_tag(&self, tag: &str, sha: &str) -> Result<()> {
        self.git_ok(&["tag", tag, sha]).await?;
        Ok(())
    }

    /// Push the local tag. The remote rejects it if the tag already points
    /// elsewhere.
    pub async fn push_tag(&self, tag: &str) -> Result<()> {
        let refspec = format!("refs/tags/{tag}:refs/tags/{tag}");
        self.git_ok(&["push", &self.remote, &refspec]).await?;
        Ok(())
    }

    /// Point local branch `name` at `sha`.
    pub async fn create_branch(&self, name: &str, sha: &str) -> Result<()> {
        self.git_ok(&["branch", "--force", name, sha]).await?;
        Ok(())
    }

    /// Push local branch `name` to the remote under the same name.
    pub async fn push_branch(&self, name: &str) -> Result<()> {
        let refspec = format!("refs/heads/{name}:refs/heads/{name}");
        self.git_ok(&["push", &self.remote, &refspec]).await?;
        Ok(())
    }

    pub async fn is_shallow(&self) -> Result<bool> {
        let stdout = self
            .git_ok(&["rev-parse", "--is-shallow-repository"])
            .await?;
        Ok(stdout == "true")
    }

    /// Fetch `branch` into `refs/remotes/<remote>/<branch>` and resolve it.
    ///
    /// Shallow clones are deepened so a following [`is_descendant`] check
    /// sees enough history.
    ///
    /// [`is_descendant`]: GitRepo::is_descendant
    pub async fn fetch_branch(&self, branch: &str) -> Result<CommitRef> {
        let tracking = self.tracking_ref(branch);
        let refspec = format!("+refs/heads/{branch}:{tracking}");
        let depth = format!("--depth={ANCESTRY_FETCH_DEPTH}");

        let mut args = vec!["fetch", "--no-tags"];
        if self.is_shallow().await? {
            args.push(&depth);
        }
        args.push(&self.remote);
        args.push(&refspec);
        self.git_ok(&args).await?;

        self.resolve_commit(&tracking).await
    }

    /// Remote-tracking ref for `branch`.
    pub fn tracking_ref(&self, branch: &str) -> String {
        format!("refs/remotes/{}/{branch}", self.remote)
    }

    /// True iff `ancestor` is reachable from `sha` (a commit is its own
    /// descendant).
    pub async fn is_descendant(&self, ancestor: &str, sha: &str) -> Result<bool> {
        let output = self
            .git(&["merge-base", "--is-ancestor", ancestor, sha])
            .await?;
        match output.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            _ => Err(git_failure(&output)),
        }
    }

    /// Contents of `path` at `rev`, or `None` when the file does not exist
    /// there. Fails when `rev` itself cannot be resolved.
    pub async fn read_file_at(&self, rev: &str, path: &str) -> Result<Option<String>> {
        self.resolve_commit(rev).await?;
        let object = format!("{rev}:{path}");
        let probe = self.git(&["cat-file", "-e", &object]).await?;
        if !probe.success() {
            return Ok(None);
        }
        let output = self.git(&["cat-file", "-p", &object]).await?;
        if !output.success() {
            return Err(git_failure(&output));
        }
        Ok(Some(output.stdout))
    }
}

async fn run(dir: &Path, args: &[&str]) -> Result<CommandOutput> {
    let spec = CommandSpec::new("git", args.iter().copied()).in_dir(dir);
    debug!(command = %spec, "git");
    CommandRunner::capture(&spec)
        .await
        .map_err(|e| FlowError::Git(format!("failed to run git: {e}")))
}

fn git_failure(output: &CommandOutput) -> FlowError {
    FlowError::Git(format!(
        "`{}` failed with exit code {}: {}",
        output.command,
        output.exit_code,
        output.stderr.trim()
    ))
}
