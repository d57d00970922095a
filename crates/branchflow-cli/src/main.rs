//! branchflow - branch-based release workflow runner
//!
//! Invoked by the CI runner on every push. Reads the repository config and
//! the forge event, wires the docker CLI and the GitHub API into the
//! workflow engine and runs the protocol of the pushed branch.
//!
//! Exit status: `0` on success (including ignored tag pushes), `2` when the
//! pushed branch has no pull request open yet, `1` for anything else.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use branchflow_core::{
    init_tracing, ActionRunner, Config, Credentials, FlowError, GitRepo, LogFormat, RunOutcome,
    WorkflowEvent,
};
use clap::error::ErrorKind;
use clap::Parser;
use docker_controller::DockerCli;
use forge_controller::{GitHubConfig, GitHubForge, DEFAULT_API_URL};
use tracing::{error, info, Level};

#[derive(Parser, Debug)]
#[command(name = "branchflow")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Branch-based release workflow runner", long_about = None)]
struct Cli {
    /// Workflow config file (JSON), relative to the workspace
    #[arg(long, env = "BRANCHFLOW_CONFIG")]
    config: PathBuf,

    /// Repository checkout
    #[arg(long, env = "GITHUB_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// Name of the triggering event
    #[arg(long, env = "GITHUB_EVENT_NAME")]
    event_name: String,

    /// Path of the event payload (JSON)
    #[arg(long, env = "GITHUB_EVENT_PATH")]
    event_path: PathBuf,

    /// Repository slug, `owner/name`
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repository: String,

    /// Token for the forge API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: String,

    /// Forge API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Registry user
    #[arg(long, env = "DOCKER_USERNAME")]
    docker_username: Option<String>,

    /// Registry password
    #[arg(long, env = "DOCKER_PASSWORD", hide_env_values = true)]
    docker_password: Option<String>,

    /// Log line format: actions, text or json
    #[arg(long, env = "BRANCHFLOW_LOG_FORMAT", default_value = "actions")]
    log_format: LogFormat,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.workspace.join(&self.config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return usage_failure(&err),
    };

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.log_format, level);

    match run(&cli).await {
        Ok(RunOutcome::Skipped { tag }) => {
            info!("Push of tag {tag} ignored");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Completed { mode, branch }) => {
            info!("{mode} workflow for {branch} succeeded");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{}", single_line(&format!("{err:#}")));
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Report a rejected command line. Help and version requests succeed.
fn usage_failure(err: &clap::Error) -> ExitCode {
    let code = parse_exit_code(err);
    if code == 0 {
        let _ = err.print();
    } else {
        init_tracing(LogFormat::Actions, Level::INFO);
        let message = err.to_string();
        error!("{}", single_line(message.trim_start_matches("error: ")));
    }
    ExitCode::from(code)
}

fn parse_exit_code(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

/// Fold a multi-line message so it stays on one `##[error]` line.
fn single_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

async fn run(cli: &Cli) -> Result<RunOutcome> {
    let config_path = cli.config_path();
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let credentials = registry_credentials(cli, &config)?;
    let event = WorkflowEvent::load(cli.event_name.as_str(), &cli.event_path)?;

    let git = open_checkout(&cli.workspace).await?;
    let docker = DockerCli::new(config.docker.clone());
    let forge = GitHubForge::new(GitHubConfig::new(
        &cli.api_url,
        &cli.repository,
        &cli.github_token,
    )?)?;

    let runner = ActionRunner::new(config, git, Arc::new(docker), Arc::new(forge))
        .with_credentials(credentials);
    Ok(runner.run(&event).await?)
}

async fn open_checkout(workspace: &Path) -> Result<GitRepo> {
    Ok(GitRepo::open(workspace).await?)
}

/// Registry credentials, mandatory unless the config disables login.
fn registry_credentials(cli: &Cli, config: &Config) -> Result<Option<Credentials>> {
    if config.docker.skip_login {
        return Ok(None);
    }
    match (&cli.docker_username, &cli.docker_password) {
        (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
            Ok(Some(Credentials {
                user: user.clone(),
                pass: pass.clone(),
            }))
        }
        _ => bail!(
            "DOCKER_USERNAME and DOCKER_PASSWORD are required unless docker.skipLogin is set"
        ),
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<FlowError>() {
        Some(flow) if flow.is_no_pull_request() => 2,
        _ => 1,
    }
}
