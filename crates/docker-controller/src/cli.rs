//! [`DockerController`] implementation shelling out to the `docker` CLI.
//!
//! Builds and pushes are streamed into the log; probes (pull, inspect, tag)
//! are captured so their output can be interpreted.

use async_trait::async_trait;
use branchflow_ci::{CommandOutput, CommandRunner, CommandSpec};
use branchflow_core::{BuildRequest, Credentials, DockerConfig, DockerController, ImageMetadata};
use tracing::{debug, info};

use crate::error::DockerError;
use crate::Result;

/// Registry replies meaning "this tag does not exist". Access denials
/// ("pull access denied ... repository does not exist") are not among them.
const MISSING_IMAGE_MARKERS: &[&str] = &["manifest unknown", "no such image"];

/// Docker client configured for one image repository.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
    config: DockerConfig,
}

impl DockerCli {
    pub fn new(config: DockerConfig) -> Self {
        Self {
            program: "docker".to_string(),
            config,
        }
    }

    /// Use another executable, e.g. `podman` or a wrapper script.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn image(&self, tag: &str) -> String {
        self.config.image_reference(tag)
    }

    fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(self.program.as_str(), args)
    }

    async fn capture_checked(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = CommandRunner::capture(spec).await?;
        if !output.success() {
            return Err(DockerError::CommandFailed {
                command: output.command,
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Arguments of `docker build` for `request`.
    pub fn build_args(&self, request: &BuildRequest) -> Vec<String> {
        let args = &self.config.args;
        vec![
            "build".to_string(),
            "--build-arg".to_string(),
            format!("{}={}", args.commit_sha, request.commit_sha),
            "--build-arg".to_string(),
            format!("{}={}", args.tree_sha, request.tree_sha),
            "-t".to_string(),
            self.image(&request.tag),
            self.config.path.clone(),
        ]
    }

    /// Arguments of `docker login`; the password goes through stdin.
    pub fn login_args(&self, credentials: &Credentials) -> Vec<String> {
        let mut args = vec![
            "login".to_string(),
            "--username".to_string(),
            credentials.user.clone(),
            "--password-stdin".to_string(),
        ];
        args.extend(self.config.registry.clone());
        args
    }
}

/// Whether a failed pull means the tag is absent rather than broken.
pub fn is_missing_image(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    if stderr.contains("pull access denied") {
        return false;
    }
    MISSING_IMAGE_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker))
        || stderr
            .lines()
            .any(|line| line.contains("manifest for ") && line.contains(" not found"))
}

/// Read the commit and tree shas from the JSON `Config.Env` of an image.
pub fn parse_env_metadata(
    image: &str,
    raw: &str,
    commit_var: &str,
    tree_var: &str,
) -> Result<ImageMetadata> {
    let env: Option<Vec<String>> =
        serde_json::from_str(raw.trim()).map_err(|e| DockerError::InvalidMetadata {
            image: image.to_string(),
            reason: e.to_string(),
        })?;
    let env = env.unwrap_or_default();

    let lookup = |name: &str| {
        env.iter().find_map(|entry| {
            entry
                .split_once('=')
                .filter(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        })
    };

    Ok(ImageMetadata {
        commit_sha: lookup(commit_var),
        tree_sha: lookup(tree_var),
    })
}

#[async_trait]
impl DockerController for DockerCli {
    async fn login(&self, credentials: &Credentials) -> branchflow_core::Result<()> {
        let spec = self
            .command(self.login_args(credentials))
            .with_stdin(credentials.pass.as_str())
            .named(format!("{} login", self.program));
        self.capture_checked(&spec).await?;
        info!("Logged in to the container registry");
        Ok(())
    }

    async fn pull_image(&self, tag: &str) -> branchflow_core::Result<bool> {
        let image = self.image(tag);
        let output = CommandRunner::capture(&self.command(["pull", image.as_str()]))
            .await
            .map_err(DockerError::from)?;
        if output.success() {
            return Ok(true);
        }
        if is_missing_image(&output.stderr) {
            debug!("Image {image} is not in the registry");
            return Ok(false);
        }
        Err(DockerError::CommandFailed {
            command: output.command,
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        }
        .into())
    }

    async fn get_metadata(&self, tag: &str) -> branchflow_core::Result<ImageMetadata> {
        let image = self.image(tag);
        let spec = self.command([
            "image",
            "inspect",
            "--format",
            "{{json .Config.Env}}",
            image.as_str(),
        ]);
        let output = self.capture_checked(&spec).await?;
        let names = &self.config.environment_variables;
        Ok(parse_env_metadata(
            &image,
            &output.stdout,
            &names.commit_sha,
            &names.tree_sha,
        )?)
    }

    async fn run_build(&self, request: &BuildRequest) -> branchflow_core::Result<()> {
        let spec = self
            .command(self.build_args(request))
            .in_dir(&request.cwd);
        CommandRunner::run_checked(&spec)
            .await
            .map_err(DockerError::from)?;
        Ok(())
    }

    async fn retag_image(&self, from_tag: &str, to_tag: &str) -> branchflow_core::Result<()> {
        let from = self.image(from_tag);
        let to = self.image(to_tag);
        self.capture_checked(&self.command(["tag", from.as_str(), to.as_str()]))
            .await?;
        Ok(())
    }

    async fn push_image(&self, tag: &str) -> branchflow_core::Result<()> {
        let image = self.image(tag);
        CommandRunner::run_checked(&self.command(["push", image.as_str()]))
            .await
            .map_err(DockerError::from)?;
        Ok(())
    }
}
