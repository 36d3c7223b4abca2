use std::collections::HashMap;
use std::sync::Arc;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use super::errors::{Result, SyncError};
use super::item::ItemRecord;
use super::reducer::{merge_remote, reduce, Mutation, Reduced};
use super::snapshot::NestedSnapshot;
use super::types::{FetchStatus, ItemId};

type Mutator = Box<dyn FnOnce(&NestedSnapshot) -> NestedSnapshot + Send>;

enum StoreCommand {
    Apply {
        mutation: Mutation,
        reply: Option<oneshot::Sender<Reduced>>,
    },
    Update {
        mutator: Mutator,
        reply: oneshot::Sender<Arc<NestedSnapshot>>,
    },
    ReplaceFromRemote {
        remote: NestedSnapshot,
        reply: oneshot::Sender<Arc<NestedSnapshot>>,
    },
    MarkStale {
        message: String,
    },
    Resolve {
        id: ItemId,
        reply: oneshot::Sender<ItemId>,
    },
}

/// What readers see: the current snapshot plus the reconciliation flag.
#[derive(Debug, Clone)]
pub struct StoreView {
    pub snapshot: Arc<NestedSnapshot>,
    pub status: FetchStatus,
    /// Bumped on every installed change
    pub version: u64,
}

/// Handle to the snapshot store.
///
/// The snapshot is owned by a single worker task; every write is a command
/// on its queue and runs as one read/compute/install step, so concurrent
/// callers can never install results computed from the same stale base.
/// Reads go through a `watch` channel and never wait on the queue.
#[derive(Clone)]
pub struct SnapshotStore {
    command_tx: mpsc::UnboundedSender<StoreCommand>,
    view_rx: watch::Receiver<StoreView>,
}

impl SnapshotStore {
    /// Spawn the store worker. Must be called inside a tokio runtime.
    pub fn new(initial: NestedSnapshot) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(StoreView {
            snapshot: Arc::new(initial),
            status: FetchStatus::Pending,
            version: 0,
        });

        let worker = StoreWorker {
            view_tx,
            aliases: HashMap::new(),
        };
        tokio::spawn(worker.run(command_rx));

        Self {
            command_tx,
            view_rx,
        }
    }

    /// Current snapshot
    pub fn read(&self) -> Arc<NestedSnapshot> {
        self.view_rx.borrow().snapshot.clone()
    }

    pub fn status(&self) -> FetchStatus {
        self.view_rx.borrow().status.clone()
    }

    pub fn view(&self) -> StoreView {
        self.view_rx.borrow().clone()
    }

    /// Receiver that wakes on every installed change
    pub fn subscribe(&self) -> watch::Receiver<StoreView> {
        self.view_rx.clone()
    }

    /// Apply a typed mutation and wait for the result
    pub async fn apply(&self, mutation: Mutation) -> Result<Reduced> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(StoreCommand::Apply {
            mutation,
            reply: Some(reply_tx),
        })?;

        reply_rx.await.map_err(|_| SyncError::Shutdown)
    }

    /// Enqueue a typed mutation without waiting. Commands from one caller are
    /// applied in the order they were posted.
    pub fn post(&self, mutation: Mutation) -> Result<()> {
        self.send(StoreCommand::Apply {
            mutation,
            reply: None,
        })
    }

    /// Run `mutator` against the latest snapshot and install its result,
    /// without contacting the remote. Aggregates are recomputed on the
    /// result so a mutator can not leave them out of step.
    pub async fn apply_optimistic<F>(&self, mutator: F) -> Result<Arc<NestedSnapshot>>
    where
        F: FnOnce(&NestedSnapshot) -> NestedSnapshot + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(StoreCommand::Update {
            mutator: Box::new(mutator),
            reply: reply_tx,
        })?;

        reply_rx.await.map_err(|_| SyncError::Shutdown)
    }

    /// Merge a freshly fetched snapshot into the current one and install it
    pub async fn replace_from_remote(&self, remote: NestedSnapshot) -> Result<Arc<NestedSnapshot>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(StoreCommand::ReplaceFromRemote {
            remote,
            reply: reply_tx,
        })?;

        reply_rx.await.map_err(|_| SyncError::Shutdown)
    }

    /// Flag the snapshot as stale after a failed fetch; the data is kept.
    pub fn mark_stale(&self, message: impl Into<String>) -> Result<()> {
        self.send(StoreCommand::MarkStale {
            message: message.into(),
        })
    }

    /// Map an id to the one currently used in the snapshot, following
    /// local -> remote renames made at completion time.
    pub async fn resolve(&self, id: &ItemId) -> Result<ItemId> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(StoreCommand::Resolve {
            id: id.clone(),
            reply: reply_tx,
        })?;

        reply_rx.await.map_err(|_| SyncError::Shutdown)
    }

    /// Remove an item, returning the record that was taken out
    pub async fn remove(&self, id: &ItemId) -> Result<Option<ItemRecord>> {
        let reduced = self.apply(Mutation::Remove { id: id.clone() }).await?;
        Ok(reduced.removed)
    }

    fn send(&self, command: StoreCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| SyncError::Shutdown)
    }
}

struct StoreWorker {
    view_tx: watch::Sender<StoreView>,
    aliases: HashMap<ItemId, ItemId>,
}

impl StoreWorker {
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<StoreCommand>) {
        while let Some(command) = command_rx.recv().await {
            self.handle_command(command);
        }

        debug!("snapshot store stopped");
    }

    fn handle_command(&mut self, command: StoreCommand) {
        match command {
            StoreCommand::Apply { mutation, reply } => {
                let reduced = self.apply(mutation);
                if let Some(reply) = reply {
                    let _ = reply.send(reduced);
                }
            }
            StoreCommand::Update { mutator, reply } => {
                let current = self.current();
                let mut next = mutator(&current);
                next.update_items(|_| ());
                let next = self.install(next);
                let _ = reply.send(next);
            }
            StoreCommand::ReplaceFromRemote { remote, reply } => {
                let current = self.current();
                let merged = merge_remote(&current, remote);
                info!(
                    count = merged.count(),
                    total_size = merged.total_size(),
                    "merged remote snapshot"
                );
                let installed = self.install_with_status(merged, FetchStatus::Fresh { at: Utc::now() });
                let _ = reply.send(installed);
            }
            StoreCommand::MarkStale { message } => {
                warn!(%message, "snapshot marked stale");
                self.view_tx.send_modify(|view| {
                    view.status = FetchStatus::Stale {
                        message,
                        at: Utc::now(),
                    };
                    view.version += 1;
                });
            }
            StoreCommand::Resolve { id, reply } => {
                let _ = reply.send(self.resolve(id));
            }
        }
    }

    fn apply(&mut self, mut mutation: Mutation) -> Reduced {
        if let Some(id) = mutation.target() {
            let resolved = self.resolve(id.clone());
            if &resolved != id {
                mutation.retarget(resolved);
            }
        }

        let renamed = match &mutation {
            Mutation::Complete { id, receipt } if *id != receipt.id => {
                Some((id.clone(), receipt.id.clone()))
            }
            _ => None,
        };

        let current = self.current();
        let mut reduced = reduce(&current, mutation);
        if !reduced.changed {
            return reduced;
        }

        if let Some((local_id, remote_id)) = renamed {
            debug!(%local_id, %remote_id, "item identity confirmed by remote");
            self.aliases.insert(local_id, remote_id);
        }

        if let Some(removed) = &reduced.removed {
            self.aliases.retain(|local_id, remote_id| *remote_id != removed.id && *local_id != removed.id);
        }

        let installed = self.install(reduced.snapshot);
        reduced.snapshot = NestedSnapshot::clone(&installed);
        reduced
    }

    fn resolve(&self, mut id: ItemId) -> ItemId {
        // 别名只会从本地 id 指向远端 id，链条很短
        while let Some(next) = self.aliases.get(&id) {
            if *next == id {
                break;
            }
            id = next.clone();
        }
        id
    }

    fn current(&self) -> Arc<NestedSnapshot> {
        self.view_tx.borrow().snapshot.clone()
    }

    fn install(&self, snapshot: NestedSnapshot) -> Arc<NestedSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.view_tx.send_modify(|view| {
            view.snapshot = snapshot.clone();
            view.version += 1;
        });
        snapshot
    }

    fn install_with_status(&self, snapshot: NestedSnapshot, status: FetchStatus) -> Arc<NestedSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.view_tx.send_modify(|view| {
            view.snapshot = snapshot.clone();
            view.status = status;
            view.version += 1;
        });
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use crate::core::types::{ItemStatus, NewItem, UploadReceipt};

    fn record(id: &str, size: u64) -> ItemRecord {
        ItemRecord::uploading(NewItem {
            name: format!("{}.bin", id),
            media_type: "application/octet-stream".to_string(),
            last_modified: None,
            payload: Some(Bytes::from(vec![0u8; size as usize])),
        })
        .with_id(id)
    }

    #[tokio::test]
    async fn test_read_reflects_applied_mutation() {
        let store = SnapshotStore::new(NestedSnapshot::default());
        assert_eq!(store.read().count(), 0);
        assert_eq!(store.status(), FetchStatus::Pending);

        let reduced = store.apply(Mutation::Insert(vec![record("a", 2), record("b", 3)])).await.unwrap();
        assert!(reduced.changed);

        let snapshot = store.read();
        assert_eq!(snapshot.count(), 2);
        assert_eq!(snapshot.total_size(), 5);
    }

    #[tokio::test]
    async fn test_concurrent_optimistic_updates_are_not_lost() {
        let store = SnapshotStore::new(NestedSnapshot::default());

        let mut handles = Vec::new();
        for i in 0..50u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .apply_optimistic(move |current| {
                        let mut next = current.clone();
                        next.update_items(|items| items.push(record(&format!("item-{}", i), i)));
                        next
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = store.read();
        assert_eq!(snapshot.count(), 50);
        assert_eq!(snapshot.total_size(), (0..50).sum::<u64>());
    }

    #[tokio::test]
    async fn test_posted_progress_is_applied_in_order() {
        let store = SnapshotStore::new(NestedSnapshot::with_items(vec![record("a", 1)]));
        for progress in [10, 5, 30, 20] {
            store.post(Mutation::Progress { id: "a".into(), progress }).unwrap();
        }
        // 等待前面投递的命令执行完
        store.resolve(&"a".into()).await.unwrap();

        assert_eq!(store.read().get(&"a".into()).unwrap().progress(), Some(30));
    }

    #[tokio::test]
    async fn test_alias_follows_confirmed_identity() {
        let store = SnapshotStore::new(NestedSnapshot::with_items(vec![record("local-1", 1)]));
        let receipt = UploadReceipt {
            id: "srv-99".into(),
            url: "/uploads/srv-99".to_string(),
            uploaded_at: Some(Utc::now()),
        };
        store.apply(Mutation::Complete { id: "local-1".into(), receipt }).await.unwrap();

        assert_eq!(store.resolve(&"local-1".into()).await.unwrap(), ItemId::from("srv-99"));
        let removed = store.remove(&"local-1".into()).await.unwrap().unwrap();
        assert_eq!(removed.id, ItemId::from("srv-99"));
        assert_eq!(removed.status(), ItemStatus::Completed);
        assert_eq!(store.read().count(), 0);

        // 条目删除后别名也随之清理
        assert_eq!(store.resolve(&"local-1".into()).await.unwrap(), ItemId::from("local-1"));
        assert_eq!(store.resolve(&"srv-99".into()).await.unwrap(), ItemId::from("srv-99"));
    }

    #[tokio::test]
    async fn test_mark_stale_keeps_snapshot() {
        let store = SnapshotStore::new(NestedSnapshot::with_items(vec![record("a", 1)]));
        let mut rx = store.subscribe();

        store.mark_stale("connection refused").unwrap();
        rx.changed().await.unwrap();

        assert!(store.status().is_stale());
        assert_eq!(store.read().count(), 1);
    }
}
