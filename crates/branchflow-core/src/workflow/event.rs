//! Forge event ingestion.

use std::path::Path;

use serde_json::Value;

use crate::error::{FlowError, Result};

pub const PUSH_EVENT: &str = "push";
pub const HEADS_PREFIX: &str = "refs/heads/";
pub const TAGS_PREFIX: &str = "refs/tags/";

/// The event that triggered the run: its name and raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowEvent {
    pub name: String,
    pub payload: Value,
}

/// What a push touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushTarget {
    Branch(String),
    Tag(String),
}

impl WorkflowEvent {
    /// Read the payload JSON at `path`.
    pub fn load(name: impl Into<String>, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Config(format!("cannot read event payload {}: {e}", path.display()))
        })?;
        let payload = serde_json::from_str(&raw).map_err(|e| {
            FlowError::Config(format!("invalid event payload {}: {e}", path.display()))
        })?;
        Ok(Self {
            name: name.into(),
            payload,
        })
    }

    /// A push event for `git_ref`.
    pub fn push(git_ref: impl Into<String>) -> Self {
        Self {
            name: PUSH_EVENT.to_string(),
            payload: serde_json::json!({ "ref": git_ref.into() }),
        }
    }

    /// Classify the pushed ref. Fails for non-push events and for refs that
    /// are neither branches nor tags.
    pub fn push_target(&self) -> Result<PushTarget> {
        if self.name != PUSH_EVENT {
            return Err(FlowError::Config(format!(
                "Unsupported event {}, only push events are handled",
                self.name
            )));
        }
        let git_ref = self
            .payload
            .get("ref")
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::Config("push event payload has no ref".to_string()))?;

        if let Some(tag) = git_ref.strip_prefix(TAGS_PREFIX) {
            Ok(PushTarget::Tag(tag.to_string()))
        } else if let Some(branch) = git_ref.strip_prefix(HEADS_PREFIX) {
            Ok(PushTarget::Branch(branch.to_string()))
        } else {
            Err(FlowError::Config(format!("Unsupported ref {git_ref}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_push() {
        let event = WorkflowEvent::push("refs/heads/release/1.2.0");
        assert_eq!(
            event.push_target().unwrap(),
            PushTarget::Branch("release/1.2.0".to_string())
        );
    }

    #[test]
    fn test_tag_push() {
        let event = WorkflowEvent::push("refs/tags/v1.2.0");
        assert_eq!(
            event.push_target().unwrap(),
            PushTarget::Tag("v1.2.0".to_string())
        );
    }

    #[test]
    fn test_non_push_event_is_rejected() {
        let event = WorkflowEvent {
            name: "pull_request".to_string(),
            payload: serde_json::json!({}),
        };
        assert!(matches!(event.push_target(), Err(FlowError::Config(_))));
    }

    #[test]
    fn test_unknown_ref_namespace() {
        let event = WorkflowEvent::push("refs/pull/3/merge");
        assert!(event.push_target().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, r#"{"ref":"refs/heads/develop","after":"abc"}"#).unwrap();
        let event = WorkflowEvent::load("push", &path).unwrap();
        assert_eq!(
            event.push_target().unwrap(),
            PushTarget::Branch("develop".to_string())
        );
    }
}
