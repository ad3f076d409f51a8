// Shared fixtures for workflow integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;

use showset_workflow::permissions::{Actor, Role, StaticPermissionResolver};
use showset_workflow::showset::{Area, LocalizedText, ShowSet, ShowSetId, ShowSetPatch, StageName, StageStatus};
use showset_workflow::store::{InMemoryShowSetStore, ShowSetStore, StoreError};
use showset_workflow::workflow::{
    CascadePolicy, ChannelTranslationQueue, InMemoryActivitySink, LocalUploadSigner, LockPolicy,
    NewShowSet, OrchestratorSettings, TranslationJob, WorkflowOrchestrator,
};

pub struct Harness {
    pub orchestrator: WorkflowOrchestrator,
    pub store: Arc<dyn ShowSetStore>,
    pub activity: Arc<InMemoryActivitySink>,
    pub jobs: tokio::sync::mpsc::UnboundedReceiver<TranslationJob>,
}

pub struct HarnessBuilder {
    store: Arc<dyn ShowSetStore>,
    cascade: Option<Arc<dyn CascadePolicy>>,
    lock: Option<Arc<dyn LockPolicy>>,
    settings: OrchestratorSettings,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryShowSetStore::new()),
            cascade: None,
            lock: None,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn ShowSetStore>) -> Self {
        self.store = store;
        self
    }

    pub fn cascade(mut self, cascade: Arc<dyn CascadePolicy>) -> Self {
        self.cascade = Some(cascade);
        self
    }

    pub fn lock(mut self, lock: Arc<dyn LockPolicy>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Harness {
        let activity = Arc::new(InMemoryActivitySink::new());
        let (queue, jobs) = ChannelTranslationQueue::new();
        let mut orchestrator = WorkflowOrchestrator::new(
            self.store.clone(),
            Arc::new(StaticPermissionResolver),
            activity.clone(),
            Arc::new(queue),
            Arc::new(LocalUploadSigner::new("http://uploads.local", 900)),
        )
        .with_settings(self.settings);
        if let Some(cascade) = self.cascade {
            orchestrator = orchestrator.with_cascade_policy(cascade);
        }
        if let Some(lock) = self.lock {
            orchestrator = orchestrator.with_lock_policy(lock);
        }
        Harness {
            orchestrator,
            store: self.store,
            activity,
            jobs,
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        HarnessBuilder::new().build()
    }

    /// Creates a ShowSet as admin.
    pub async fn seed(&self, id: &str) -> ShowSet {
        self.orchestrator
            .create_show_set(&admin(), new_show_set(id))
            .await
            .expect("seed showset")
    }

    /// Overwrites stage statuses directly in the store, bypassing the workflow.
    pub async fn force_statuses(&self, id: &str, statuses: &[(StageName, StageStatus)]) -> ShowSet {
        let mut show_set = self.load(id).await;
        for (stage, status) in statuses {
            show_set.stage_mut(*stage).status = *status;
        }
        self.store.put(&show_set).await.expect("put showset")
    }

    pub async fn force_all(&self, id: &str, status: StageStatus) -> ShowSet {
        let statuses: Vec<_> = StageName::ALL.into_iter().map(|s| (s, status)).collect();
        self.force_statuses(id, &statuses).await
    }

    pub async fn load(&self, id: &str) -> ShowSet {
        self.orchestrator.get_show_set(id).await.expect("load showset")
    }
}

pub fn new_show_set(id: &str) -> NewShowSet {
    NewShowSet {
        id: id.to_string(),
        area: Area::Interior,
        scene: "Lobby".to_string(),
        description: LocalizedText::default(),
        related_items: Vec::new(),
    }
}

pub fn admin() -> Actor {
    Actor::new("admin-1", "Ada Admin", Role::Admin)
}

pub fn manager() -> Actor {
    Actor::new("manager-1", "Mia Manager", Role::Manager)
}

pub fn artist() -> Actor {
    Actor::new("artist-1", "Uma Artist", Role::Artist)
}

pub fn engineer() -> Actor {
    Actor::new("engineer-1", "Eli Engineer", Role::Engineer)
}

pub fn viewer() -> Actor {
    Actor::new("viewer-1", "Vic Viewer", Role::Viewer)
}

/// Store wrapper that yields after every read, so two operations joined on
/// one task both read before either writes.
pub struct YieldingStore {
    inner: InMemoryShowSetStore,
}

impl YieldingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryShowSetStore::new(),
        }
    }
}

#[async_trait]
impl ShowSetStore for YieldingStore {
    async fn get(&self, id: &ShowSetId) -> Result<Option<ShowSet>, StoreError> {
        let record = self.inner.get(id).await;
        tokio::task::yield_now().await;
        record
    }

    async fn create(&self, show_set: &ShowSet) -> Result<ShowSet, StoreError> {
        self.inner.create(show_set).await
    }

    async fn put(&self, show_set: &ShowSet) -> Result<ShowSet, StoreError> {
        self.inner.put(show_set).await
    }

    async fn update(
        &self,
        id: &ShowSetId,
        expected_revision: u64,
        patch: &ShowSetPatch,
    ) -> Result<ShowSet, StoreError> {
        self.inner.update(id, expected_revision, patch).await
    }

    async fn delete(&self, id: &ShowSetId) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }

    async fn list(&self) -> Result<Vec<ShowSet>, StoreError> {
        self.inner.list().await
    }
}
