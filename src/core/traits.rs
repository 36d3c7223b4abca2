use async_trait::async_trait;
use tracing::{info, warn};
use super::errors::Result;
use super::item::ItemRecord;
use super::progress::ProgressReporter;
use super::snapshot::NestedSnapshot;
use super::types::{ItemId, NotifyKind, UploadReceipt};

/// Authoritative source of the nested document
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Idempotent read used for the initial load and every reconciliation
    async fn fetch_snapshot(&self) -> Result<NestedSnapshot>;
}

/// Remote store for item bytes
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Transmit one item's payload. `progress` may be called any number of
    /// times with non-decreasing percentages before this resolves.
    async fn upload(&self, item: &ItemRecord, progress: ProgressReporter) -> Result<UploadReceipt>;

    /// Remove a confirmed item from the remote store
    async fn delete(&self, id: &ItemId) -> Result<()>;
}

/// Fire-and-forget user notifications (toasts)
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NotifyKind, title: &str, message: &str);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NotifyKind, title: &str, message: &str) {
        match kind {
            NotifyKind::Success => info!(title, "{}", message),
            NotifyKind::Failure => warn!(title, "{}", message),
        }
    }
}
