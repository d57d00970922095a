//! Shared fixtures: a work tree with a bare `origin`, a config, and a runner
//! wired to in-memory capabilities.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use branchflow_core::fakes::{FakeDocker, FakeForge};
use branchflow_core::{ActionRunner, Config, GitRepo};

pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
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

/// Work tree on `develop` declaring `version`, pushed to a bare origin.
pub struct Repo {
    pub origin: tempfile::TempDir,
    pub work: tempfile::TempDir,
}

impl Repo {
    pub fn new(version: &str) -> Self {
        let origin = tempfile::tempdir().unwrap();
        run_git(origin.path(), &["init", "--bare", "--quiet"]);

        let work = tempfile::tempdir().unwrap();
        let repo = Self { origin, work };
        repo.git(&["init", "--quiet"]);
        repo.git(&["config", "user.name", "test-user"]);
        repo.git(&["config", "user.email", "test@example.com"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        repo.git(&["config", "tag.gpgsign", "false"]);
        repo.git(&["checkout", "--quiet", "-b", "develop"]);
        repo.set_version(version);
        let origin_path = repo.origin.path().to_str().unwrap().to_string();
        repo.git(&["remote", "add", "origin", &origin_path]);
        repo.push("develop");
        repo
    }

    pub fn dir(&self) -> &Path {
        self.work.path()
    }

    pub fn git(&self, args: &[&str]) -> String {
        run_git(self.dir(), args)
    }

    pub fn origin_git(&self, args: &[&str]) -> String {
        run_git(self.origin.path(), args)
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"])
    }

    pub fn head_tree(&self) -> String {
        self.git(&["rev-parse", "HEAD^{tree}"])
    }

    /// Create `branch` at HEAD, check it out and push it.
    pub fn branch(&self, branch: &str) {
        self.git(&["checkout", "--quiet", "-b", branch]);
        self.push(branch);
    }

    pub fn checkout(&self, branch: &str) {
        self.git(&["checkout", "--quiet", branch]);
    }

    pub fn push(&self, branch: &str) {
        self.git(&["push", "--quiet", "origin", &format!("{branch}:{branch}")]);
    }

    /// Commit a manifest declaring `version`.
    pub fn set_version(&self, version: &str) -> String {
        self.commit_file(
            "package.json",
            &format!("{{\n  \"name\": \"app\",\n  \"version\": \"{version}\"\n}}\n"),
        )
    }

    pub fn commit_file(&self, name: &str, contents: &str) -> String {
        std::fs::write(self.dir().join(name), contents).unwrap();
        self.git(&["add", name]);
        self.git(&["commit", "--quiet", "-m", name]);
        self.head()
    }

    /// Sha of `refname` on the remote, if it exists.
    pub fn remote_ref(&self, refname: &str) -> Option<String> {
        let output = Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", refname])
            .current_dir(self.origin.path())
            .output()
            .unwrap();
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

pub const CONFIG: &str = r#"{
    "stagingEnvironmentBranch": "env/staging",
    "developmentEnvironmentBranches": ["env/dev"],
    "repoType": "node",
    "docker": {
        "path": ".",
        "args": { "commitSha": "COMMIT_SHA", "treeSha": "TREE_SHA" },
        "environmentVariables": { "commitSha": "COMMIT_SHA", "treeSha": "TREE_SHA" },
        "repository": "ghcr.io/acme/app",
        "registry": "ghcr.io"
    },
    "ci": [],
    "mergebackLabels": ["mergeback"],
    "deployments": {
        "environments": [
            { "branch": "env/prod", "environment": "production" },
            { "branch": "env/dev", "environment": "development" }
        ]
    }
}"#;

pub fn config() -> Config {
    Config::from_json(CONFIG).unwrap()
}

pub fn config_with_ci(commands: &[&str]) -> Config {
    let mut config = config();
    config.ci = commands.iter().map(|c| c.to_string()).collect();
    config
}

pub struct Harness {
    pub runner: ActionRunner,
    pub docker: Arc<FakeDocker>,
    pub forge: Arc<FakeForge>,
}

pub async fn harness(repo: &Repo, config: Config) -> Harness {
    harness_with(repo, config, Arc::new(FakeDocker::new()), Arc::new(FakeForge::new())).await
}

pub async fn harness_with(
    repo: &Repo,
    config: Config,
    docker: Arc<FakeDocker>,
    forge: Arc<FakeForge>,
) -> Harness {
    let git = GitRepo::open(repo.dir()).await.unwrap();
    let runner = ActionRunner::new(config, git, docker.clone(), forge.clone());
    Harness {
        runner,
        docker,
        forge,
    }
}
