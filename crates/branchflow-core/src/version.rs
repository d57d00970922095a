//! Declared release version, read from the manifest at a given commit.

use crate::config::RepoType;
use crate::error::{Result, VersionError};
use crate::git::GitRepo;

/// Read the `version` field of the manifest as it exists at `rev`.
pub async fn read_version(repo: &GitRepo, repo_type: RepoType, rev: &str) -> Result<String> {
    let file = repo_type.manifest_path();
    let raw = repo
        .read_file_at(rev, file)
        .await?
        .ok_or_else(|| VersionError::MissingFile {
            file: file.to_string(),
            rev: rev.to_string(),
        })?;
    Ok(parse_version(repo_type, &raw, rev)?)
}

/// Extract the version from manifest contents.
pub fn parse_version(
    repo_type: RepoType,
    raw: &str,
    rev: &str,
) -> std::result::Result<String, VersionError> {
    let file = repo_type.manifest_path();
    let manifest: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| VersionError::InvalidJson {
            file: file.to_string(),
            rev: rev.to_string(),
            reason: e.to_string(),
        })?;

    match manifest.get("version") {
        Some(serde_json::Value::String(version)) => Ok(version.clone()),
        _ => Err(VersionError::InvalidVersionField {
            file: file.to_string(),
            rev: rev.to_string(),
        }),
    }
}
