use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::code::ErrorCode;

/// Terminal error attached to a failed [`crate::task::TaskResult`].
///
/// Values are stored inside task state and persisted rows, so the type is
/// cloneable and serializable rather than wrapping arbitrary sources.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    #[error("task was cancelled")]
    Cancelled,

    #[error("unresolved dependencies: {}", pending.join(", "))]
    UnresolvedDependencies { pending: Vec<String> },

    #[error("capability '{name}' failed: {message}")]
    Capability { name: String, message: String },

    #[error("reasoning model call failed: {0}")]
    Model(String),

    #[error("task is already running")]
    AlreadyRunning,

    #[error("task execution panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Cancelled => ErrorCode::Cancelled,
            Self::UnresolvedDependencies { .. } => ErrorCode::DependencyError,
            Self::Capability { .. } => ErrorCode::ToolError,
            Self::Model(_) => ErrorCode::ModelError,
            Self::AlreadyRunning => ErrorCode::GeneralError,
            Self::Panicked(_) => ErrorCode::Panicked,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Errors that a further attempt cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::UnresolvedDependencies { .. } | Self::AlreadyRunning
        )
    }
}
