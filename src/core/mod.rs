mod engine;
mod errors;
mod item;
mod orchestrator;
mod progress;
mod reconciler;
mod snapshot;
mod store;
mod traits;
mod types;
pub mod reducer;

pub use engine::{SyncEngine, SyncEngineBuilder};
pub use errors::{Result, SyncError};
pub use item::{ItemRecord, UPLOAD_FAILED_MESSAGE};
pub use orchestrator::UploadOrchestrator;
pub use progress::{percentage, ProgressReporter};
pub use reconciler::Reconciler;
pub use reducer::{merge_remote, Mutation, Reduced};
pub use snapshot::{Metadata, NestedSnapshot};
pub use store::{SnapshotStore, StoreView};
pub use traits::{Notifier, SnapshotSource, TracingNotifier, Uploader};
pub use types::{
    FetchStatus,
    ItemId,
    ItemState,
    ItemStatus,
    NewItem,
    NotifyKind,
    Rejection,
    SubmitReport,
    UploadReceipt,
};
