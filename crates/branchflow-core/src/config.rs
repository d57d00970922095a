//! Run configuration loaded from the repository's JSON config file.
//!
//! Optional fields are defaulted once during deserialisation and the whole
//! document is validated immediately after parsing, so the rest of the crate
//! reads plain values without re-checking optionality.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::mode::{ENV_PREFIX, PRODUCTION_BRANCH};

/// The two accepted names of the staging environment branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagingBranch {
    #[serde(rename = "env/staging")]
    Staging,
    #[serde(rename = "env/stage")]
    Stage,
}

impl StagingBranch {
    pub fn as_str(&self) -> &'static str {
        match self {
            StagingBranch::Staging => "env/staging",
            StagingBranch::Stage => "env/stage",
        }
    }
}

/// Where the release version is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
    /// `package.json`, field `version`.
    Node,
}

impl RepoType {
    /// Manifest path relative to the repository root.
    pub fn manifest_path(&self) -> &'static str {
        match self {
            RepoType::Node => "package.json",
        }
    }
}

/// Names of a commit/tree pair, used both for build args and for the
/// environment variables baked into the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaNames {
    pub commit_sha: String,
    pub tree_sha: String,
}

/// Container build parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerConfig {
    /// Build context, relative to the checkout.
    #[serde(default = "default_build_path")]
    pub path: String,

    /// Build-arg names receiving the commit and tree sha.
    pub args: ShaNames,

    /// Environment variable names exposing the commit and tree sha inside
    /// the built image.
    pub environment_variables: ShaNames,

    /// Image repository, e.g. `ghcr.io/acme/app`.
    pub repository: String,

    /// Registry host to log in to. When set, `repository` must live in it.
    #[serde(default)]
    pub registry: Option<String>,

    /// Skip `docker login`; no credentials are required.
    #[serde(default)]
    pub skip_login: bool,
}

fn default_build_path() -> String {
    ".".to_string()
}

impl DockerConfig {
    /// Fully qualified image reference for `tag`.
    pub fn image_reference(&self, tag: &str) -> String {
        format!("{}:{}", self.repository, tag)
    }
}

/// Binds an environment branch to a forge deployment environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentBinding {
    pub branch: String,
    pub environment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentsConfig {
    #[serde(default)]
    pub environments: Vec<DeploymentBinding>,
}

/// Pull request authors that need special treatment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutomationConfig {
    /// Authors whose pull requests get plain comments instead of reviews,
    /// because the acting token cannot review them.
    pub comment_authors: Vec<String>,

    /// Authors whose pull requests get no feedback at all.
    pub ignored_authors: Vec<String>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            comment_authors: vec!["github-actions[bot]".to_string()],
            ignored_authors: vec!["dependabot[bot]".to_string()],
        }
    }
}

/// Immutable per-run settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub staging_environment_branch: StagingBranch,

    #[serde(default)]
    pub development_environment_branches: Vec<String>,

    pub repo_type: RepoType,

    pub docker: DockerConfig,

    /// Shell commands run for CI, in order.
    #[serde(default)]
    pub ci: Vec<String>,

    #[serde(default)]
    pub mergeback_labels: Vec<String>,

    #[serde(default)]
    pub deployments: DeploymentsConfig,

    #[serde(default)]
    pub automation: AutomationConfig,
}

impl Config {
    /// Read, parse and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Config(format!(
                "cannot read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw)
            .map_err(|e| FlowError::Config(format!("invalid config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation.
    pub fn validate(&self) -> Result<()> {
        let staging = self.staging_branch();
        for branch in &self.development_environment_branches {
            if !branch.starts_with(ENV_PREFIX) {
                return Err(FlowError::Config(format!(
                    "development environment branch {branch} must start with {ENV_PREFIX}"
                )));
            }
            if branch == PRODUCTION_BRANCH || branch == staging {
                return Err(FlowError::Config(format!(
                    "development environment branch {branch} clashes with a release environment branch"
                )));
            }
        }

        if let Some(registry) = &self.docker.registry {
            let prefix = format!("{registry}/");
            if !self.docker.repository.starts_with(&prefix) {
                return Err(FlowError::Config(format!(
                    "docker.repository {} must start with {prefix}",
                    self.docker.repository
                )));
            }
        }

        if self.docker.repository.is_empty() {
            return Err(FlowError::Config(
                "docker.repository must not be empty".to_string(),
            ));
        }

        for binding in &self.deployments.environments {
            if binding.branch.is_empty() || binding.environment.is_empty() {
                return Err(FlowError::Config(
                    "deployment bindings need both a branch and an environment".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn staging_branch(&self) -> &'static str {
        self.staging_environment_branch.as_str()
    }

    /// Deployment environment bound to `branch`, if any.
    pub fn deployment_for(&self, branch: &str) -> Option<&DeploymentBinding> {
        self.deployments
            .environments
            .iter()
            .find(|binding| binding.branch == branch)
    }
}
