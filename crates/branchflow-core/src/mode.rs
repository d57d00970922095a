//! Branch taxonomy and push classification.

use std::fmt;

use crate::config::Config;
use crate::error::{FlowError, Result};

pub const PRODUCTION_BRANCH: &str = "env/prod";
pub const DEVELOP_BRANCH: &str = "develop";
pub const ENV_PREFIX: &str = "env/";
pub const HOTFIX_PREFIX: &str = "hotfix/";
pub const RELEASE_PREFIX: &str = "release/";
pub const MERGEBACK_PREFIX: &str = "mergeback/";

/// Workflow mode selected for a pushed branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    EnvProduction,
    EnvStaging,
    EnvDevelopment,
    Hotfix,
    Release,
    Develop,
    Other,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::EnvProduction => "env-production",
            Mode::EnvStaging => "env-staging",
            Mode::EnvDevelopment => "env-development",
            Mode::Hotfix => "hotfix",
            Mode::Release => "release",
            Mode::Develop => "develop",
            Mode::Other => "other",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a pushed branch to its workflow mode.
///
/// The production, staging and development checks run before the generic
/// `env/` rejection, so only unlisted environment branches fail.
pub fn classify(config: &Config, branch: &str) -> Result<Mode> {
    if branch == PRODUCTION_BRANCH {
        return Ok(Mode::EnvProduction);
    }
    if branch == config.staging_branch() {
        return Ok(Mode::EnvStaging);
    }
    if config
        .development_environment_branches
        .iter()
        .any(|dev| dev == branch)
    {
        return Ok(Mode::EnvDevelopment);
    }
    if branch.starts_with(ENV_PREFIX) {
        return Err(FlowError::InvalidDevelopmentBranch {
            branch: branch.to_string(),
            allowed: config.development_environment_branches.join(", "),
        });
    }
    if branch.starts_with(HOTFIX_PREFIX) {
        return Ok(Mode::Hotfix);
    }
    if branch.starts_with(RELEASE_PREFIX) {
        return Ok(Mode::Release);
    }
    if branch == DEVELOP_BRANCH {
        return Ok(Mode::Develop);
    }
    Ok(Mode::Other)
}
