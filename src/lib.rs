pub mod core;
pub mod uploaders;
pub mod utils;
pub mod config;

// 重新导出核心类型
pub use self::core::{
    SyncEngine,
    SyncEngineBuilder,
    SnapshotStore,
    UploadOrchestrator,
    Reconciler,
    NestedSnapshot,
    ItemRecord,
    ItemId,
    ItemStatus,
    NewItem,
    UploadReceipt,
    FetchStatus,
    SubmitReport,
    SyncError,
    Result,
};

pub use config::SyncConfig;

// 重新导出上传器
pub use uploaders::HttpRemote;
