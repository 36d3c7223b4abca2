use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use super::errors::{Result, SyncError};
use super::snapshot::NestedSnapshot;
use super::store::SnapshotStore;
use super::traits::SnapshotSource;

enum ReconcileCommand {
    /// A refetch is worthwhile; coalesced with others inside the window
    Schedule,
    /// Fetch right away and report the outcome
    RefreshNow {
        reply: oneshot::Sender<Result<Arc<NestedSnapshot>>>,
    },
}

/// Decides when the remote snapshot is fetched again.
///
/// Refetch requests open a dedupe window; every request that lands inside
/// it is served by the single fetch made when the window closes. Requests
/// that arrive while that fetch is running open the next window. Fetch
/// results are always merged into the store, never installed as-is, and
/// local mutations keep flowing to the store while a fetch is in flight.
#[derive(Clone)]
pub struct Reconciler {
    command_tx: mpsc::UnboundedSender<ReconcileCommand>,
    cancellation_token: CancellationToken,
}

impl Reconciler {
    pub fn new(source: Arc<dyn SnapshotSource>, store: SnapshotStore, dedupe_interval: Duration) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancellation_token = CancellationToken::new();

        let worker = ReconcileWorker {
            source,
            store,
            dedupe_interval,
            deadline: None,
            fetches: 0,
        };
        tokio::spawn(worker.run(command_rx, cancellation_token.clone()));

        Self {
            command_tx,
            cancellation_token,
        }
    }

    /// Ask for a refetch at the end of the current dedupe window
    pub fn schedule(&self) {
        let _ = self.command_tx.send(ReconcileCommand::Schedule);
    }

    /// Fetch and merge immediately
    pub async fn refresh_now(&self) -> Result<Arc<NestedSnapshot>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(ReconcileCommand::RefreshNow { reply: reply_tx })
            .map_err(|_| SyncError::Shutdown)?;

        reply_rx.await.map_err(|_| SyncError::Shutdown)?
    }

    pub fn shutdown(&self) {
        self.cancellation_token.cancel();
    }
}

struct ReconcileWorker {
    source: Arc<dyn SnapshotSource>,
    store: SnapshotStore,
    dedupe_interval: Duration,
    deadline: Option<Instant>,
    fetches: u64,
}

impl ReconcileWorker {
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<ReconcileCommand>,
        cancellation_token: CancellationToken,
    ) {
        loop {
            let deadline = self.deadline.unwrap_or_else(Instant::now);

            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                command = command_rx.recv() => match command {
                    Some(ReconcileCommand::Schedule) => {
                        if self.deadline.is_none() {
                            debug!(window = ?self.dedupe_interval, "refetch scheduled");
                            self.deadline = Some(Instant::now() + self.dedupe_interval);
                        }
                    }
                    Some(ReconcileCommand::RefreshNow { reply }) => {
                        // 立即拉取同时满足已经排队的请求
                        self.deadline = None;
                        let result = self.fetch().await;
                        let _ = reply.send(result);
                    }
                    None => break,
                },
                _ = sleep_until(deadline), if self.deadline.is_some() => {
                    self.deadline = None;
                    let _ = self.fetch().await;
                }
            }
        }

        debug!(fetches = self.fetches, "reconciler stopped");
    }

    async fn fetch(&mut self) -> Result<Arc<NestedSnapshot>> {
        self.fetches += 1;
        debug!(fetch = self.fetches, "fetching remote snapshot");

        match self.source.fetch_snapshot().await {
            Ok(remote) => {
                let merged = self.store.replace_from_remote(remote).await?;
                info!(count = merged.count(), "reconciled with remote");
                Ok(merged)
            }
            Err(err) => {
                warn!(error = %err, "reconciliation fetch failed, keeping current snapshot");
                self.store.mark_stale(err.to_string())?;
                Err(err)
            }
        }
    }
}
