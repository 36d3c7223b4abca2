//! The nested document shared by the remote and the client.
//!
//! Only `files.member` and the aggregates derived from it are owned by the
//! engine. Everything else (`config`, `user`, `analytics`,
//! `metadata.systemInfo`, unknown keys) is carried through untouched.

use std::cmp::Ordering;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use super::item::ItemRecord;
use super::types::{ItemId, ItemStatus};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Mirrors `files.count`
    #[serde(default)]
    total_count: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    pub fn total_count(&self) -> usize {
        self.total_count
    }
}

/// The item collection with its aggregates. The aggregates are private and
/// only ever recomputed from `member`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCollection {
    member: Vec<ItemRecord>,
    total_size: u64,
    count: usize,
}

impl FileCollection {
    fn from_items(member: Vec<ItemRecord>) -> Self {
        let mut files = Self {
            member,
            total_size: 0,
            count: 0,
        };
        files.recompute();
        files
    }

    fn recompute(&mut self) {
        self.count = self.member.len();
        self.total_size = self.member.iter().map(|item| item.size).sum();
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NestedSnapshot {
    metadata: Metadata,
    files: FileCollection,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Wire shape accepted from the remote. Aggregates sent by the remote are
/// ignored and recomputed from `files.member`.
#[derive(Deserialize)]
struct SnapshotDocument {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    files: FilesDocument,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Deserialize, Default)]
struct FilesDocument {
    #[serde(default)]
    member: Vec<ItemRecord>,
}

impl From<SnapshotDocument> for NestedSnapshot {
    fn from(document: SnapshotDocument) -> Self {
        let mut snapshot = Self {
            metadata: document.metadata,
            files: FileCollection::default(),
            extra: document.extra,
        };
        snapshot.set_items(document.files.member);
        snapshot
    }
}

impl<'de> Deserialize<'de> for NestedSnapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        SnapshotDocument::deserialize(deserializer).map(Self::from)
    }
}

impl NestedSnapshot {
    pub fn with_items(items: Vec<ItemRecord>) -> Self {
        let mut snapshot = Self::default();
        snapshot.set_items(items);
        snapshot
    }

    pub fn items(&self) -> &[ItemRecord] {
        &self.files.member
    }

    pub fn count(&self) -> usize {
        self.files.count
    }

    pub fn total_size(&self) -> u64 {
        self.files.total_size
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Top-level fields the engine does not interpret.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    pub fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }

    pub fn get(&self, id: &ItemId) -> Option<&ItemRecord> {
        self.files.member.iter().find(|item| &item.id == id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.get(id).is_some()
    }

    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.files.member.iter().position(|item| &item.id == id)
    }

    pub fn count_by_status(&self, status: ItemStatus) -> usize {
        self.files.member.iter().filter(|item| item.status() == status).count()
    }

    /// Mutate the item collection. Aggregates are recomputed before this
    /// returns, in the same step as the change itself.
    pub fn update_items<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Vec<ItemRecord>) -> R,
    {
        let result = f(&mut self.files.member);
        self.recompute_aggregates();
        result
    }

    pub fn set_items(&mut self, items: Vec<ItemRecord>) {
        self.files = FileCollection::from_items(items);
        self.metadata.total_count = self.files.count;
    }

    fn recompute_aggregates(&mut self) {
        self.files.recompute();
        self.metadata.total_count = self.files.count;
    }

    /// Stamp `metadata.lastUpdated` with the current time
    pub fn touch(&mut self) {
        self.metadata.last_updated = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
    }

    /// In-flight and failed items first, then confirmed items newest first.
    /// Confirmed items the remote sent without a timestamp go last.
    pub fn sort_newest_first(&mut self) {
        self.update_items(|items| {
            items.sort_by(|a, b| {
                let a_done = a.status() == ItemStatus::Completed;
                let b_done = b.status() == ItemStatus::Completed;
                match (a_done, b_done) {
                    (false, false) => Ordering::Equal,
                    (false, true) => Ordering::Less,
                    (true, false) => Ordering::Greater,
                    (true, true) => match (a.uploaded_at(), b.uploaded_at()) {
                        (None, None) => Ordering::Equal,
                        (None, Some(_)) => Ordering::Greater,
                        (Some(_), None) => Ordering::Less,
                        (Some(x), Some(y)) => y.cmp(&x),
                    },
                }
            });
        });
    }
}
