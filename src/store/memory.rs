use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{apply_conditional, ShowSetStore, StoreError};
use crate::showset::{ShowSet, ShowSetId, ShowSetPatch};

/// Process-local store. The write lock makes each call atomic.
#[derive(Debug, Default)]
pub struct InMemoryShowSetStore {
    records: RwLock<BTreeMap<ShowSetId, ShowSet>>,
}

impl InMemoryShowSetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShowSetStore for InMemoryShowSetStore {
    async fn get(&self, id: &ShowSetId) -> Result<Option<ShowSet>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn create(&self, show_set: &ShowSet) -> Result<ShowSet, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&show_set.id) {
            return Err(StoreError::AlreadyExists(show_set.id.to_string()));
        }
        let mut stored = show_set.clone();
        stored.revision = 1;
        records.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn put(&self, show_set: &ShowSet) -> Result<ShowSet, StoreError> {
        let mut records = self.records.write().await;
        let mut stored = show_set.clone();
        stored.revision = records.get(&show_set.id).map(|r| r.revision).unwrap_or(0) + 1;
        records.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        id: &ShowSetId,
        expected_revision: u64,
        patch: &ShowSetPatch,
    ) -> Result<ShowSet, StoreError> {
        let mut records = self.records.write().await;
        let current = records
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let next = apply_conditional(current, expected_revision, patch)?;
        records.insert(id.clone(), next.clone());
        Ok(next)
    }

    async fn delete(&self, id: &ShowSetId) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<ShowSet>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}
