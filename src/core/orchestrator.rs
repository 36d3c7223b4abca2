use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use super::errors::{Result, SyncError};
use super::item::{ItemRecord, UPLOAD_FAILED_MESSAGE};
use super::progress::ProgressReporter;
use super::reconciler::Reconciler;
use super::reducer::Mutation;
use super::store::SnapshotStore;
use super::traits::{Notifier, Uploader};
use super::types::{ItemId, ItemStatus, NewItem, NotifyKind, Rejection, SubmitReport};

/// Starts one upload task per accepted item and routes every task event
/// into the snapshot store.
///
/// All tasks of a batch run at the same time; correctness comes from the
/// store's serialized mutation queue, not from limiting the tasks.
#[derive(Clone)]
pub struct UploadOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    store: SnapshotStore,
    uploader: Arc<dyn Uploader>,
    notifier: Arc<dyn Notifier>,
    reconciler: Reconciler,
    max_file_size: u64,
    tracker: TaskTracker,
}

impl UploadOrchestrator {
    pub fn new(
        store: SnapshotStore,
        uploader: Arc<dyn Uploader>,
        notifier: Arc<dyn Notifier>,
        reconciler: Reconciler,
        max_file_size: u64,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                store,
                uploader,
                notifier,
                reconciler,
                max_file_size,
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.inner.max_file_size
    }

    /// Validate a batch, insert the accepted items in one mutation and start
    /// their uploads. Rejected items never reach the snapshot.
    pub async fn submit(&self, items: Vec<NewItem>) -> Result<SubmitReport> {
        let mut report = SubmitReport::default();
        let mut records = Vec::with_capacity(items.len());

        for item in items {
            match self.validate(&item) {
                Ok(()) => records.push(ItemRecord::uploading(item)),
                Err(error) => {
                    warn!(name = %item.name, error = %error, "file rejected");
                    self.inner.notifier.notify(
                        NotifyKind::Failure,
                        "Upload failed",
                        &format!("Cannot upload {}. {}", item.name, error),
                    );
                    report.rejected.push(Rejection {
                        name: item.name,
                        error,
                    });
                }
            }
        }

        if records.is_empty() {
            return Ok(report);
        }

        report.accepted = records.iter().map(|record| record.id.clone()).collect();
        info!(accepted = records.len(), rejected = report.rejected.len(), "submitting batch");

        // 一次性插入整批记录
        self.inner.store.apply(Mutation::Insert(records.clone())).await?;

        for record in records {
            self.spawn_upload(record);
        }

        Ok(report)
    }

    /// The limit applies to the bytes that will actually be sent
    fn validate(&self, item: &NewItem) -> Result<()> {
        if item.payload.is_none() {
            return Err(SyncError::MissingPayload(item.name.clone()));
        }

        let size = item.size();
        if size > self.inner.max_file_size {
            return Err(SyncError::FileTooLarge {
                name: item.name.clone(),
                size,
                limit: self.inner.max_file_size,
            });
        }

        Ok(())
    }

    fn spawn_upload(&self, record: ItemRecord) {
        let this = self.clone();
        self.inner.tracker.spawn(async move {
            this.run_upload(record).await;
        });
    }

    async fn run_upload(&self, record: ItemRecord) {
        let id = record.id.clone();
        debug!(%id, name = %record.name, size = record.size, "upload started");

        let reporter = ProgressReporter::new(id.clone(), self.inner.store.clone());
        let result = self.inner.uploader.upload(&record, reporter).await;

        match result {
            Ok(receipt) => {
                let remote_id = receipt.id.clone();
                let reduced = self.inner.store.apply(Mutation::Complete { id: id.clone(), receipt }).await;

                match reduced {
                    Ok(reduced) if reduced.changed => {
                        info!(%id, %remote_id, "upload completed");
                        self.inner.notifier.notify(
                            NotifyKind::Success,
                            "Upload successful",
                            &format!("{} has been uploaded successfully.", record.name),
                        );
                        self.inner.reconciler.schedule();
                    }
                    Ok(_) => debug!(%id, "completion for removed item ignored"),
                    Err(err) => warn!(%id, error = %err, "could not record completion"),
                }
            }
            Err(err) => {
                warn!(%id, error = %err, "upload failed");
                let reduced = self.inner.store.apply(Mutation::Fail {
                    id: id.clone(),
                    message: UPLOAD_FAILED_MESSAGE.to_string(),
                }).await;

                match reduced {
                    Ok(reduced) if reduced.changed => {
                        self.inner.notifier.notify(
                            NotifyKind::Failure,
                            "Upload failed",
                            &format!("Failed to upload {}. Please try again.", record.name),
                        );
                    }
                    Ok(_) => debug!(%id, "failure for removed item ignored"),
                    Err(err) => warn!(%id, error = %err, "could not record failure"),
                }
            }
        }
    }

    /// Remove an item. Completed items are deleted on the remote as well;
    /// uploading and failed items only exist locally.
    ///
    /// An in-flight upload is not cancelled, its late events are ignored.
    pub async fn remove(&self, id: &ItemId) -> Result<()> {
        let Some(removed) = self.inner.store.remove(id).await? else {
            return Err(SyncError::ItemNotFound(id.clone()));
        };

        if removed.status() != ItemStatus::Completed {
            debug!(id = %removed.id, status = %removed.status(), "removed local item");
            return Ok(());
        }

        match self.inner.uploader.delete(&removed.id).await {
            Ok(()) => {
                info!(id = %removed.id, "file deleted");
                self.inner.notifier.notify(
                    NotifyKind::Success,
                    "File removed",
                    "The file has been removed successfully.",
                );
                self.inner.reconciler.schedule();
                Ok(())
            }
            Err(err) => {
                warn!(id = %removed.id, error = %err, "delete failed, restoring from remote");
                self.rollback_removal(removed).await;
                self.inner.notifier.notify(
                    NotifyKind::Failure,
                    "Delete failed",
                    "Failed to delete file. Please try again.",
                );
                Err(err)
            }
        }
    }

    async fn rollback_removal(&self, removed: ItemRecord) {
        if self.inner.reconciler.refresh_now().await.is_ok() {
            return;
        }

        // 远端不可用时把记录放回去，避免界面显示一个远端仍然存在的文件已被删除
        if let Err(err) = self.inner.store.apply(Mutation::Insert(vec![removed])).await {
            warn!(error = %err, "could not restore removed item");
        }
    }

    /// Wait until every upload task started so far has finished
    pub async fn wait_idle(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }

    pub fn active_uploads(&self) -> usize {
        self.inner.tracker.len()
    }
}
