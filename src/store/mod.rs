// ShowSet persistence
//
// Every write goes through one of these calls, and each call is atomic for
// its ShowSet. `update` is the compare-and-swap used by workflow operations.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::showset::{ShowSet, ShowSetId, ShowSetPatch};

pub use file::FileShowSetStore;
pub use memory::InMemoryShowSetStore;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("showset not found: {0}")]
    NotFound(String),

    #[error("showset already exists: {0}")]
    AlreadyExists(String),

    #[error("concurrent conflict on showset {id}: expected revision {expected}, found {found}")]
    Conflict { id: String, expected: u64, found: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Key-value store of ShowSets keyed by id.
///
/// Implementations own the `revision` field: every successful write returns
/// the stored record with its revision advanced by one.
#[async_trait]
pub trait ShowSetStore: Send + Sync {
    async fn get(&self, id: &ShowSetId) -> Result<Option<ShowSet>, StoreError>;

    /// Inserts a new record at revision 1. Fails with `AlreadyExists`.
    async fn create(&self, show_set: &ShowSet) -> Result<ShowSet, StoreError>;

    /// Unconditional full replace.
    async fn put(&self, show_set: &ShowSet) -> Result<ShowSet, StoreError>;

    /// Applies `patch` only if the stored revision equals `expected_revision`.
    async fn update(
        &self,
        id: &ShowSetId,
        expected_revision: u64,
        patch: &ShowSetPatch,
    ) -> Result<ShowSet, StoreError>;

    /// Returns `false` when nothing was stored under `id`.
    async fn delete(&self, id: &ShowSetId) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<ShowSet>, StoreError>;
}

/// Shared compare-and-swap step for the built-in backends.
pub(crate) fn apply_conditional(
    current: &ShowSet,
    expected_revision: u64,
    patch: &ShowSetPatch,
) -> Result<ShowSet, StoreError> {
    if current.revision != expected_revision {
        return Err(StoreError::Conflict {
            id: current.id.to_string(),
            expected: expected_revision,
            found: current.revision,
        });
    }
    let mut next = current.clone();
    patch.apply_to(&mut next);
    next.revision = current.revision + 1;
    Ok(next)
}
