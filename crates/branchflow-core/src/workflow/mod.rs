//! Branch workflow engine.
//!
//! One run handles one push: it checks the repository preconditions,
//! classifies the pushed branch into a [`Mode`] and executes that mode's
//! protocol exactly once. Side effects already performed (pushed tags,
//! mergeback branches) are left in place when a later step fails; re-running
//! the push observes them and short-circuits.

mod environment;
pub mod event;
mod pull_request;

use std::sync::Arc;

use branchflow_ci::{CommandRunner, CommandSpec};
use tracing::info;

use crate::config::Config;
use crate::docker::{Credentials, DockerController};
use crate::error::{FlowError, Result};
use crate::forge::ForgeController;
use crate::git::{CommitRef, GitRepo};
use crate::mode::{classify, Mode};
use crate::version::read_version;

pub use event::{PushTarget, WorkflowEvent};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Tag pushes never trigger the workflow.
    Skipped { tag: String },
    Completed { mode: Mode, branch: String },
}

/// Per-run facts shared by the mode protocols.
#[derive(Debug, Clone)]
pub(crate) struct RunContext {
    pub mode: Mode,
    pub branch: String,
    pub version: String,
    pub head: CommitRef,
}

impl RunContext {
    /// The release tag for the declared version.
    pub fn release_tag(&self) -> String {
        format!("v{}", self.version)
    }

    /// The pre-release tag for the declared version.
    pub fn pre_release_tag(&self) -> String {
        format!("v{}-pre", self.version)
    }
}

/// The action runner: owns the checkout and the injected capabilities for
/// the duration of one run.
pub struct ActionRunner {
    config: Config,
    git: GitRepo,
    docker: Arc<dyn DockerController>,
    forge: Arc<dyn ForgeController>,
    credentials: Option<Credentials>,
}

impl ActionRunner {
    pub fn new(
        config: Config,
        git: GitRepo,
        docker: Arc<dyn DockerController>,
        forge: Arc<dyn ForgeController>,
    ) -> Self {
        Self {
            config,
            git,
            docker,
            forge,
            credentials: None,
        }
    }

    /// Registry credentials used before the first image operation.
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle one forge event.
    pub async fn run(&self, event: &WorkflowEvent) -> Result<RunOutcome> {
        info!("Using remote {}", self.git.remote());
        let version = read_version(&self.git, self.config.repo_type, "HEAD").await?;
        info!("Declared version is {version}");

        let branch = match event.push_target()? {
            PushTarget::Tag(tag) => {
                info!("Push of tag {tag}, nothing to do");
                return Ok(RunOutcome::Skipped { tag });
            }
            PushTarget::Branch(branch) => branch,
        };

        let checked_out = self.git.current_branch().await?;
        if checked_out != branch {
            return Err(FlowError::Internal(format!(
                "checked out branch {checked_out} does not match pushed branch {branch}"
            )));
        }

        let mode = classify(&self.config, &branch)?;
        let head = self.git.resolve_commit("HEAD").await?;
        info!(
            "Running {mode} workflow for {branch} at {} (tree {})",
            head.sha, head.tree
        );

        let ctx = RunContext {
            mode,
            branch,
            version,
            head,
        };

        match mode {
            Mode::EnvProduction | Mode::EnvStaging => self.release_environment(&ctx).await?,
            Mode::EnvDevelopment => self.development_environment(&ctx).await?,
            Mode::Hotfix | Mode::Release => self.release_candidate(&ctx).await?,
            Mode::Develop => self.run_ci().await?,
            Mode::Other => self.feature_branch(&ctx).await?,
        }

        info!("Workflow {mode} finished for {}", ctx.branch);
        Ok(RunOutcome::Completed {
            mode,
            branch: ctx.branch,
        })
    }

    /// Log in to the registry when credentials were supplied.
    async fn login(&self) -> Result<()> {
        match &self.credentials {
            Some(credentials) => {
                info!("Logging in to the container registry as {}", credentials.user);
                self.docker.login(credentials).await
            }
            None => Ok(()),
        }
    }

    /// Run the configured CI commands in the checkout, in order.
    async fn run_ci(&self) -> Result<()> {
        if self.config.ci.is_empty() {
            info!("No CI commands configured");
            return Ok(());
        }
        let specs: Vec<CommandSpec> = self
            .config
            .ci
            .iter()
            .map(|line| CommandSpec::shell(line.as_str()).in_dir(self.git.dir()))
            .collect();
        CommandRunner::run_all(&specs).await?;
        info!("CI commands passed");
        Ok(())
    }
}
