#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Notify;
use upsync::core::{
    ItemRecord,
    NestedSnapshot,
    Notifier,
    NotifyKind,
    ProgressReporter,
    SnapshotSource,
    StoreView,
    Uploader,
};
use upsync::{ItemId, NewItem, SyncConfig, SyncEngine, SyncError, UploadReceipt};

/// How the mock remote answers an upload, keyed by file name
#[derive(Clone, Default)]
pub struct Script {
    pub progress: Vec<u8>,
    /// Id the remote assigns; defaults to `srv-<name>`
    pub remote_id: Option<String>,
    pub fail: bool,
    pub delay: Duration,
    /// Hold the upload after its progress events until released
    pub gated: bool,
}

/// 模拟远端 - 用于测试
#[derive(Default)]
pub struct MockRemote {
    scripts: Mutex<HashMap<String, Script>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    reported: Mutex<HashMap<String, Arc<Notify>>>,
    remote: Mutex<NestedSnapshot>,
    uploads: Mutex<Vec<String>>,
    deletes: Mutex<Vec<ItemId>>,
    fetches: AtomicUsize,
    fetch_gate: Mutex<Option<Arc<Notify>>>,
    fetch_started: Notify,
    fail_fetch: AtomicBool,
    fail_delete: AtomicBool,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, name: &str, script: Script) {
        if script.gated {
            self.gates.lock().unwrap().insert(name.to_string(), Arc::new(Notify::new()));
        }
        self.scripts.lock().unwrap().insert(name.to_string(), script);
    }

    /// Let a gated upload finish
    pub fn release(&self, name: &str) {
        if let Some(gate) = self.gates.lock().unwrap().get(name) {
            gate.notify_one();
        }
    }

    /// Resolves once the upload for `name` has sent all its progress events
    pub async fn wait_reported(&self, name: &str) {
        let notify = self.reported_notify(name);
        notify.notified().await;
    }

    fn reported_notify(&self, name: &str) -> Arc<Notify> {
        self.reported
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    pub fn set_remote(&self, snapshot: NestedSnapshot) {
        *self.remote.lock().unwrap() = snapshot;
    }

    pub fn remote_snapshot(&self) -> NestedSnapshot {
        self.remote.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<ItemId> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Hold the next fetch until `release_fetch`
    pub fn gate_fetch(&self) {
        *self.fetch_gate.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    pub fn release_fetch(&self) {
        if let Some(gate) = self.fetch_gate.lock().unwrap().take() {
            gate.notify_one();
        }
    }

    /// Resolves once a fetch has reached the remote
    pub async fn wait_fetch_started(&self) {
        self.fetch_started.notified().await;
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotSource for MockRemote {
    async fn fetch_snapshot(&self) -> upsync::Result<NestedSnapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetch_started.notify_one();

        let gate = self.fetch_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(SyncError::server_error(500, "Failed to fetch data"));
        }
        Ok(self.remote_snapshot())
    }
}

#[async_trait]
impl Uploader for MockRemote {
    async fn upload(&self, item: &ItemRecord, progress: ProgressReporter) -> upsync::Result<UploadReceipt> {
        self.uploads.lock().unwrap().push(item.name.clone());
        let script = self.scripts.lock().unwrap().get(&item.name).cloned().unwrap_or_default();

        for value in &script.progress {
            progress.report(*value);
        }
        self.reported_notify(&item.name).notify_one();

        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        let gate = self.gates.lock().unwrap().get(&item.name).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if script.fail {
            return Err(SyncError::server_error(500, "File upload failed"));
        }

        let remote_id = script.remote_id.unwrap_or_else(|| format!("srv-{}", item.name));
        let receipt = UploadReceipt {
            id: ItemId::from(remote_id.as_str()),
            url: format!("/uploads/{}-{}", remote_id, item.name),
            uploaded_at: Some(Utc::now()),
        };

        // 服务端保存了文件
        let stored = ItemRecord::completed(remote_id.as_str(), item.name.clone(), item.size, receipt.url.clone(), receipt.uploaded_at);
        self.remote.lock().unwrap().update_items(|items| items.insert(0, stored));

        Ok(receipt)
    }

    async fn delete(&self, id: &ItemId) -> upsync::Result<()> {
        self.deletes.lock().unwrap().push(id.clone());
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(SyncError::server_error(500, "Failed to delete file"));
        }

        self.remote.lock().unwrap().update_items(|items| items.retain(|item| &item.id != id));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(NotifyKind, String, String)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(NotifyKind, String, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn titles(&self, kind: NotifyKind) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, title, _)| title)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NotifyKind, title: &str, message: &str) {
        self.events.lock().unwrap().push((kind, title.to_string(), message.to_string()));
    }
}

pub fn config(max_file_size: u64, dedupe_interval: Duration) -> SyncConfig {
    SyncConfig {
        max_file_size,
        dedupe_interval,
        ..Default::default()
    }
}

pub fn engine(remote: Arc<MockRemote>, notifier: Arc<RecordingNotifier>, config: SyncConfig) -> SyncEngine {
    SyncEngine::builder(config)
        .remote(remote)
        .notifier(notifier)
        .build()
        .unwrap()
}

/// A picked file whose payload is `size` bytes long
pub fn item(name: &str, size: u64) -> NewItem {
    NewItem::new(name, "application/octet-stream", Bytes::from(vec![0u8; size as usize]))
}

/// Wait until the store shows a snapshot satisfying `predicate`
pub async fn wait_for<F>(engine: &SyncEngine, mut predicate: F) -> StoreView
where
    F: FnMut(&StoreView) -> bool,
{
    let mut rx = engine.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let view = rx.borrow_and_update();
                if predicate(&view) {
                    return view.clone();
                }
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("condition not reached in time")
}

pub fn assert_consistent(snapshot: &NestedSnapshot) {
    assert_eq!(snapshot.count(), snapshot.items().len());
    assert_eq!(snapshot.total_size(), snapshot.items().iter().map(|item| item.size).sum::<u64>());
    assert_eq!(snapshot.metadata().total_count(), snapshot.items().len());
}
