use std::sync::atomic::{AtomicU8, Ordering};
use tracing::trace;
use super::reducer::Mutation;
use super::store::SnapshotStore;
use super::types::ItemId;

/// Whole percentage of `done` out of `total`, rounded to nearest.
/// An empty transfer counts as finished.
pub fn percentage(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }

    let done = done.min(total) as u128;
    let total = total as u128;
    ((done * 100 + total / 2) / total) as u8
}

/// Progress callback handed to an upload task.
///
/// Each report is posted to the snapshot store as a `Progress` mutation for
/// this item. Values that do not move forward are filtered here already;
/// the store drops any that still arrive late.
pub struct ProgressReporter {
    id: ItemId,
    store: SnapshotStore,
    last: AtomicU8,
}

impl ProgressReporter {
    pub fn new(id: ItemId, store: SnapshotStore) -> Self {
        Self {
            id,
            store,
            last: AtomicU8::new(0),
        }
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn report(&self, progress: u8) {
        let progress = progress.min(100);
        let previous = self.last.fetch_max(progress, Ordering::Relaxed);
        if progress <= previous {
            return;
        }

        trace!(id = %self.id, progress, "upload progress");
        // 存储已关闭时进度无处可去，直接丢弃
        let _ = self.store.post(Mutation::Progress {
            id: self.id.clone(),
            progress,
        });
    }

    pub fn report_bytes(&self, done: u64, total: u64) {
        self.report(percentage(done, total));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(0, 1000), 0);
        assert_eq!(percentage(300, 1000), 30);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(5000, 1000), 100);
        assert_eq!(percentage(0, 0), 100);
    }
}
