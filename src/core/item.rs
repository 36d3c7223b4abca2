use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::types::{ItemId, ItemState, ItemStatus, NewItem, UploadReceipt};

/// Fixed message stored on items whose upload failed. There is no automatic
/// retry; the user re-submits the file instead.
pub const UPLOAD_FAILED_MESSAGE: &str = "Upload failed";

/// One upload, from the moment it is picked until its terminal outcome.
///
/// `name`, `size` and `media_type` never change after creation. The
/// status-dependent fields live in [`ItemState`] and can only be changed
/// through the transition methods below.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: ItemId,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub media_type: String,
    #[serde(flatten)]
    state: ItemState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    /// Local bytes to transmit, gone once the upload task has finished
    #[serde(skip)]
    payload: Option<Bytes>,
}

impl ItemRecord {
    /// New record in the initial `uploading` state with a local id.
    pub fn uploading(item: NewItem) -> Self {
        let size = item.size();
        Self {
            id: ItemId::local(),
            name: item.name,
            size,
            media_type: item.media_type,
            state: ItemState::Uploading { progress: 0 },
            last_modified: item.last_modified,
            payload: item.payload,
        }
    }

    /// A record the remote already confirmed
    pub fn completed(
        id: impl Into<ItemId>,
        name: impl Into<String>,
        size: u64,
        url: impl Into<String>,
        uploaded_at: impl Into<Option<DateTime<Utc>>>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
            media_type: "application/octet-stream".to_string(),
            state: ItemState::Completed {
                url: url.into(),
                uploaded_at: uploaded_at.into(),
            },
            last_modified: None,
            payload: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<ItemId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn state(&self) -> &ItemState {
        &self.state
    }

    pub fn status(&self) -> ItemStatus {
        self.state.status()
    }

    pub fn is_uploading(&self) -> bool {
        self.status() == ItemStatus::Uploading
    }

    pub fn progress(&self) -> Option<u8> {
        match &self.state {
            ItemState::Uploading { progress } => Some(*progress),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            ItemState::Error { error } => Some(error.as_str()),
            _ => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match &self.state {
            ItemState::Completed { url, .. } => Some(url.as_str()),
            _ => None,
        }
    }

    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            ItemState::Completed { uploaded_at, .. } => *uploaded_at,
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// uploading -> uploading (progress), uploading -> completed | error.
    /// Terminal states have no way out.
    pub fn is_valid_transition(from: ItemStatus, to: ItemStatus) -> bool {
        matches!(
            (from, to),
            (ItemStatus::Uploading, ItemStatus::Uploading)
                | (ItemStatus::Uploading, ItemStatus::Completed)
                | (ItemStatus::Uploading, ItemStatus::Error)
        )
    }

    /// Record a progress value. Values not above the current one are
    /// dropped, so stored progress never regresses. Returns whether the
    /// record changed.
    pub fn apply_progress(&mut self, progress: u8) -> bool {
        match &mut self.state {
            ItemState::Uploading { progress: current } if progress.min(100) > *current => {
                *current = progress.min(100);
                true
            }
            _ => false,
        }
    }

    /// Move to `completed`, taking the remote's identity, url and timestamp.
    pub fn complete(&mut self, receipt: UploadReceipt) -> bool {
        if !Self::is_valid_transition(self.status(), ItemStatus::Completed) {
            return false;
        }

        self.id = receipt.id;
        self.state = ItemState::Completed {
            url: receipt.url,
            uploaded_at: receipt.uploaded_at,
        };
        self.payload = None;
        true
    }

    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !Self::is_valid_transition(self.status(), ItemStatus::Error) {
            return false;
        }

        self.state = ItemState::Error { error: message.into() };
        self.payload = None;
        true
    }
}
