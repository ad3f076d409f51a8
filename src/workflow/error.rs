use thiserror::Error;

use crate::showset::UnknownStage;
use crate::store::StoreError;
use crate::versioning::VersionError;

/// Errors surfaced by workflow operations. None of them leave partial state
/// behind: a failed operation commits nothing.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid stage '{0}'")]
    InvalidStage(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Another writer changed the ShowSet between read and write. Re-read and
    /// retry.
    #[error("concurrent modification of showset {show_set_id}: expected revision {expected_revision}")]
    Conflict {
        show_set_id: String,
        expected_revision: u64,
    },

    #[error("store error: {0}")]
    Store(String),
}

/// The caller-facing error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Forbidden,
    NotFound,
    Conflict,
    Internal,
}

impl WorkflowError {
    pub fn validation(reason: impl Into<String>) -> Self {
        WorkflowError::Validation(reason.into())
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        WorkflowError::Forbidden(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::InvalidStage(_) | WorkflowError::Validation(_) => ErrorKind::Validation,
            WorkflowError::Forbidden(_) => ErrorKind::Forbidden,
            WorkflowError::NotFound(_) => ErrorKind::NotFound,
            WorkflowError::Conflict { .. } => ErrorKind::Conflict,
            WorkflowError::Store(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl From<UnknownStage> for WorkflowError {
    fn from(err: UnknownStage) -> Self {
        WorkflowError::InvalidStage(err.0)
    }
}

impl From<VersionError> for WorkflowError {
    fn from(err: VersionError) -> Self {
        WorkflowError::Validation(err.to_string())
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => WorkflowError::NotFound(format!("showset {id}")),
            StoreError::AlreadyExists(id) => {
                WorkflowError::Validation(format!("showset {id} already exists"))
            }
            StoreError::Conflict { id, expected, .. } => WorkflowError::Conflict {
                show_set_id: id,
                expected_revision: expected,
            },
            other => WorkflowError::Store(other.to_string()),
        }
    }
}

/// Failure of a best-effort collaborator (activity sink, translation queue,
/// upload signer). Logged and swallowed by the orchestrator.
#[derive(Debug, Error)]
pub enum SideEffectError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
