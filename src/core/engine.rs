use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;
use crate::config::SyncConfig;
use super::errors::{Result, SyncError};
use super::orchestrator::UploadOrchestrator;
use super::reconciler::Reconciler;
use super::snapshot::NestedSnapshot;
use super::store::{SnapshotStore, StoreView};
use super::traits::{Notifier, SnapshotSource, TracingNotifier, Uploader};
use super::types::{FetchStatus, ItemId, NewItem, SubmitReport};

/// Store, reconciler and orchestrator wired together.
#[derive(Clone)]
pub struct SyncEngine {
    store: SnapshotStore,
    reconciler: Reconciler,
    orchestrator: UploadOrchestrator,
}

impl SyncEngine {
    pub fn builder(config: SyncConfig) -> SyncEngineBuilder {
        SyncEngineBuilder::new(config)
    }

    /// Initial load. On failure the engine keeps the empty snapshot and
    /// reports a stale status; it stays usable.
    pub async fn initialize(&self) -> Result<Arc<NestedSnapshot>> {
        self.reconciler.refresh_now().await
    }

    pub async fn submit(&self, items: Vec<NewItem>) -> Result<SubmitReport> {
        self.orchestrator.submit(items).await
    }

    pub async fn remove(&self, id: &ItemId) -> Result<()> {
        self.orchestrator.remove(id).await
    }

    pub async fn refresh_now(&self) -> Result<Arc<NestedSnapshot>> {
        self.reconciler.refresh_now().await
    }

    pub async fn wait_idle(&self) {
        self.orchestrator.wait_idle().await
    }

    pub fn snapshot(&self) -> Arc<NestedSnapshot> {
        self.store.read()
    }

    pub fn status(&self) -> FetchStatus {
        self.store.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreView> {
        self.store.subscribe()
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn orchestrator(&self) -> &UploadOrchestrator {
        &self.orchestrator
    }

    pub fn shutdown(&self) {
        self.reconciler.shutdown();
    }
}

pub struct SyncEngineBuilder {
    config: SyncConfig,
    source: Option<Arc<dyn SnapshotSource>>,
    uploader: Option<Arc<dyn Uploader>>,
    notifier: Arc<dyn Notifier>,
    initial: NestedSnapshot,
}

impl SyncEngineBuilder {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            source: None,
            uploader: None,
            notifier: Arc::new(TracingNotifier),
            initial: NestedSnapshot::default(),
        }
    }

    /// Use one collaborator for fetching, uploading and deleting
    pub fn remote<R>(mut self, remote: Arc<R>) -> Self
    where
        R: SnapshotSource + Uploader + 'static,
    {
        self.source = Some(remote.clone());
        self.uploader = Some(remote);
        self
    }

    pub fn source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Seed the store before the first fetch
    pub fn initial_snapshot(mut self, snapshot: NestedSnapshot) -> Self {
        self.initial = snapshot;
        self
    }

    /// Spawns the store and reconciler workers, so this must run inside a
    /// tokio runtime.
    pub fn build(self) -> Result<SyncEngine> {
        let source = self.source
            .ok_or_else(|| SyncError::InvalidConfig("no snapshot source configured".to_string()))?;
        let uploader = self.uploader
            .ok_or_else(|| SyncError::InvalidConfig("no uploader configured".to_string()))?;

        if self.config.max_file_size == 0 {
            warn!("max_file_size is 0, every non-empty file will be rejected");
        }

        let store = SnapshotStore::new(self.initial);
        let reconciler = Reconciler::new(source, store.clone(), self.config.dedupe_interval);
        let orchestrator = UploadOrchestrator::new(
            store.clone(),
            uploader,
            self.notifier,
            reconciler.clone(),
            self.config.max_file_size,
        );

        Ok(SyncEngine {
            store,
            reconciler,
            orchestrator,
        })
    }
}
