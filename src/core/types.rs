use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use super::errors::SyncError;

const LOCAL_ID_PREFIX: &str = "local-";

/// Item identity. Remote ids are opaque strings; local ids carry the
/// `local-` prefix so they can never collide with one the remote assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh client-side id
    pub fn local() -> Self {
        Self(format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4().simple()))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// 上传状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// 上传中
    Uploading,
    /// 已完成
    Completed,
    /// 失败
    Error,
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ItemStatus::Uploading => "uploading",
            ItemStatus::Completed => "completed",
            ItemStatus::Error => "error",
        };
        f.pad(name)
    }
}

/// Per-status payload of an item. Each variant only carries the fields
/// that are meaningful in that status, so a record can never hold a
/// progress value and a url at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemState {
    Uploading {
        #[serde(default)]
        progress: u8,
    },
    Completed {
        url: String,
        /// Only ever set from what the remote reports
        #[serde(rename = "uploadedAt", default, skip_serializing_if = "Option::is_none")]
        uploaded_at: Option<DateTime<Utc>>,
    },
    Error {
        #[serde(default)]
        error: String,
    },
}

impl ItemState {
    pub fn status(&self) -> ItemStatus {
        match self {
            ItemState::Uploading { .. } => ItemStatus::Uploading,
            ItemState::Completed { .. } => ItemStatus::Completed,
            ItemState::Error { .. } => ItemStatus::Error,
        }
    }
}

/// A file the user picked, before it becomes an [`ItemRecord`].
#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub media_type: String,
    pub last_modified: Option<i64>,
    pub payload: Option<Bytes>,
}

impl NewItem {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, payload: Bytes) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            last_modified: None,
            payload: Some(payload),
        }
    }

    /// Size in bytes of the payload that will be sent
    pub fn size(&self) -> u64 {
        self.payload.as_ref().map_or(0, |payload| payload.len() as u64)
    }

    pub fn with_last_modified(mut self, last_modified: i64) -> Self {
        self.last_modified = Some(last_modified);
        self
    }
}

/// What the remote hands back once it has stored an item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub id: ItemId,
    pub url: String,
    /// `None` when the remote did not report a timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Success,
    Failure,
}

/// Outcome of the most recent reconciliation fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchStatus {
    /// Nothing has been fetched yet, the snapshot is the empty default
    #[default]
    Pending,
    Fresh {
        at: DateTime<Utc>,
    },
    /// The last fetch failed; the snapshot is the last known good one
    Stale {
        message: String,
        at: DateTime<Utc>,
    },
}

impl FetchStatus {
    pub fn is_stale(&self) -> bool {
        matches!(self, FetchStatus::Stale { .. })
    }
}

#[derive(Debug)]
pub struct Rejection {
    pub name: String,
    pub error: SyncError,
}

/// Result of a `submit` call
#[derive(Debug, Default)]
pub struct SubmitReport {
    /// Ids of the accepted items, in submission order
    pub accepted: Vec<ItemId>,
    pub rejected: Vec<Rejection>,
}

// 静态断言确保类型是 Send 的
const _: fn() = || {
    fn assert_send<T: Send + Sync>() {}
    assert_send::<ItemId>();
    assert_send::<ItemState>();
    assert_send::<NewItem>();
    assert_send::<UploadReceipt>();
};
