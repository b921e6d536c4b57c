//! Error taxonomy for declaration, rendering and convergence.
//!
//! Declaration-time variants (`InvalidPath`, `InvalidVariables`, ...) abort a
//! run before anything is applied. Apply-time variants are captured on the
//! resource result and the run carries on with independent resources.

use serde::{Deserialize, Serialize};

use crate::types::resource::{Action, ResourceId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvergeError {
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("{resource}: variables must be a mapping, got {found}")]
    InvalidVariables { resource: String, found: String },

    #[error("config type must be one of: xml, properties, env, script, got {value:?}")]
    InvalidConfigKind { value: String },

    #[error("{resource}: invalid property '{property}': {reason}")]
    InvalidProperty {
        resource: String,
        property: String,
        reason: String,
    },

    #[error("{resource}: action '{action}' is not supported")]
    InvalidAction { resource: ResourceId, action: Action },

    #[error("resource {id} is already declared in this run")]
    DuplicateResource { id: ResourceId },

    #[error("{from} notifies {action} on {to}, which is not declared in this run")]
    UnresolvedNotification {
        from: ResourceId,
        to: ResourceId,
        action: Action,
    },

    #[error("notification chain from {id} exceeded {depth} immediate hops")]
    NotificationLoop { id: ResourceId, depth: usize },

    #[error("failed to render template '{template}': {message}")]
    TemplateRender { template: String, message: String },

    #[error("verification of {path} failed: {message}")]
    Verification { path: String, message: String },

    #[error("{resource}: {collaborator} failed: {message}")]
    UpstreamCollaborator {
        resource: String,
        collaborator: String,
        message: String,
    },

    #[error("skipped because {upstream} failed")]
    SkippedDueToUpstreamFailure { upstream: ResourceId },

    #[error("unknown recipe '{0}'")]
    UnknownRecipe(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("run lock: {0}")]
    Lock(String),
}

/// Serialisable classification recorded on failed resource results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidPath,
    InvalidVariables,
    InvalidConfigKind,
    InvalidProperty,
    InvalidAction,
    DuplicateResource,
    UnresolvedNotification,
    NotificationLoop,
    TemplateRender,
    Verification,
    UpstreamCollaborator,
    SkippedDueToUpstreamFailure,
    UnknownRecipe,
    Settings,
    Lock,
}

impl ConvergeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvergeError::InvalidPath { .. } => ErrorKind::InvalidPath,
            ConvergeError::InvalidVariables { .. } => ErrorKind::InvalidVariables,
            ConvergeError::InvalidConfigKind { .. } => ErrorKind::InvalidConfigKind,
            ConvergeError::InvalidProperty { .. } => ErrorKind::InvalidProperty,
            ConvergeError::InvalidAction { .. } => ErrorKind::InvalidAction,
            ConvergeError::DuplicateResource { .. } => ErrorKind::DuplicateResource,
            ConvergeError::UnresolvedNotification { .. } => ErrorKind::UnresolvedNotification,
            ConvergeError::NotificationLoop { .. } => ErrorKind::NotificationLoop,
            ConvergeError::TemplateRender { .. } => ErrorKind::TemplateRender,
            ConvergeError::Verification { .. } => ErrorKind::Verification,
            ConvergeError::UpstreamCollaborator { .. } => ErrorKind::UpstreamCollaborator,
            ConvergeError::SkippedDueToUpstreamFailure { .. } => {
                ErrorKind::SkippedDueToUpstreamFailure
            }
            ConvergeError::UnknownRecipe(_) => ErrorKind::UnknownRecipe,
            ConvergeError::Settings(_) => ErrorKind::Settings,
            ConvergeError::Lock(_) => ErrorKind::Lock,
        }
    }

    /// Only collaborator failures are worth another attempt; everything else
    /// is deterministic given the same desired state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConvergeError::UpstreamCollaborator { .. })
    }

    pub(crate) fn upstream(resource: &ResourceId, collaborator: &str, message: String) -> Self {
        ConvergeError::UpstreamCollaborator {
            resource: resource.to_string(),
            collaborator: collaborator.to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::resource::ResourceKind;

    #[test]
    fn upstream_message_names_resource_and_collaborator() {
        let id = ResourceId::new(ResourceKind::Package, "openjdk-11-jdk");
        let err = ConvergeError::upstream(&id, "package manager", "E: Unable to locate".into());
        assert_eq!(
            err.to_string(),
            "package[openjdk-11-jdk]: package manager failed: E: Unable to locate"
        );
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::UpstreamCollaborator);
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = ConvergeError::InvalidPath {
            path: "relative/path".into(),
            reason: "must be absolute".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::SkippedDueToUpstreamFailure).unwrap();
        assert_eq!(json, "\"skipped_due_to_upstream_failure\"");
    }
}
