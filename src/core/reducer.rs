//! Pure `(old, mutation) -> new` transitions over a [`NestedSnapshot`].
//!
//! Nothing in here touches the network or shared state; the store actor
//! calls these one at a time, which is what makes every mutation atomic.

use std::collections::{HashMap, HashSet};
use tracing::debug;
use super::item::ItemRecord;
use super::snapshot::NestedSnapshot;
use super::types::{ItemId, UploadReceipt};

/// Typed events posted to the store
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Insert a batch of new records at the front, in one step
    Insert(Vec<ItemRecord>),
    Progress {
        id: ItemId,
        progress: u8,
    },
    Complete {
        id: ItemId,
        receipt: UploadReceipt,
    },
    Fail {
        id: ItemId,
        message: String,
    },
    Remove {
        id: ItemId,
    },
    SortNewestFirst,
}

impl Mutation {
    /// The item this mutation is keyed on, if any
    pub fn target(&self) -> Option<&ItemId> {
        match self {
            Mutation::Progress { id, .. }
            | Mutation::Complete { id, .. }
            | Mutation::Fail { id, .. }
            | Mutation::Remove { id } => Some(id),
            Mutation::Insert(_) | Mutation::SortNewestFirst => None,
        }
    }

    pub(crate) fn retarget(&mut self, new_id: ItemId) {
        match self {
            Mutation::Progress { id, .. }
            | Mutation::Complete { id, .. }
            | Mutation::Fail { id, .. }
            | Mutation::Remove { id } => *id = new_id,
            Mutation::Insert(_) | Mutation::SortNewestFirst => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reduced {
    pub snapshot: NestedSnapshot,
    /// false when the mutation was a no-op (unknown id, stale progress,
    /// terminal item)
    pub changed: bool,
    /// The record taken out by `Remove`
    pub removed: Option<ItemRecord>,
}

impl Reduced {
    fn unchanged(snapshot: &NestedSnapshot) -> Self {
        Self {
            snapshot: snapshot.clone(),
            changed: false,
            removed: None,
        }
    }
}

pub fn reduce(old: &NestedSnapshot, mutation: Mutation) -> Reduced {
    match mutation {
        Mutation::Insert(records) => insert(old, records),
        Mutation::Progress { id, progress } => {
            update_item(old, &id, |item| item.apply_progress(progress))
        }
        Mutation::Complete { id, receipt } => complete(old, &id, receipt),
        Mutation::Fail { id, message } => update_item(old, &id, |item| item.fail(message)),
        Mutation::Remove { id } => remove(old, &id),
        Mutation::SortNewestFirst => {
            let mut snapshot = old.clone();
            snapshot.sort_newest_first();
            let changed = snapshot != *old;
            Reduced { snapshot, changed, removed: None }
        }
    }
}

fn insert(old: &NestedSnapshot, records: Vec<ItemRecord>) -> Reduced {
    let mut seen: HashSet<ItemId> = old.items().iter().map(|item| item.id.clone()).collect();
    let fresh: Vec<ItemRecord> = records
        .into_iter()
        .filter(|record| seen.insert(record.id.clone()))
        .collect();

    if fresh.is_empty() {
        return Reduced::unchanged(old);
    }

    let mut snapshot = old.clone();
    snapshot.update_items(|items| {
        items.splice(0..0, fresh);
    });

    Reduced { snapshot, changed: true, removed: None }
}

fn update_item<F>(old: &NestedSnapshot, id: &ItemId, f: F) -> Reduced
where
    F: FnOnce(&mut ItemRecord) -> bool,
{
    let Some(index) = old.position(id) else {
        debug!(%id, "mutation for unknown item ignored");
        return Reduced::unchanged(old);
    };

    let mut snapshot = old.clone();
    let changed = snapshot.update_items(|items| f(&mut items[index]));
    if !changed {
        return Reduced::unchanged(old);
    }

    Reduced { snapshot, changed, removed: None }
}

fn complete(old: &NestedSnapshot, id: &ItemId, receipt: UploadReceipt) -> Reduced {
    let Some(index) = old.position(id) else {
        debug!(%id, "completion for unknown item ignored");
        return Reduced::unchanged(old);
    };

    let new_id = receipt.id.clone();
    let mut snapshot = old.clone();
    let changed = snapshot.update_items(|items| {
        if !items[index].complete(receipt) {
            return false;
        }

        // A refetch may already have brought in the confirmed copy under
        // the remote id. The completed local record replaces it.
        let mut position = 0;
        items.retain(|item| {
            let keep = position == index || item.id != new_id;
            position += 1;
            keep
        });
        true
    });

    if !changed {
        return Reduced::unchanged(old);
    }

    snapshot.touch();
    Reduced { snapshot, changed, removed: None }
}

fn remove(old: &NestedSnapshot, id: &ItemId) -> Reduced {
    let Some(index) = old.position(id) else {
        return Reduced::unchanged(old);
    };

    let mut snapshot = old.clone();
    let removed = snapshot.update_items(|items| items.remove(index));
    snapshot.touch();

    Reduced {
        snapshot,
        changed: true,
        removed: Some(removed),
    }
}

/// Merge a freshly fetched remote snapshot into the local one.
///
/// * remote item whose local twin is still uploading: keep the local copy
/// * any other remote item: take the remote copy
/// * local uploading item: always kept, even when the remote has no record
/// * local completed/error item missing from the remote: dropped
///
/// Kept in-flight items that the remote does not know yet come first, in
/// local order, followed by the remote items in remote order. Opaque fields
/// and metadata come from the remote; aggregates are recomputed.
pub fn merge_remote(local: &NestedSnapshot, remote: NestedSnapshot) -> NestedSnapshot {
    let in_flight: HashMap<&ItemId, &ItemRecord> = local
        .items()
        .iter()
        .filter(|item| item.is_uploading())
        .map(|item| (&item.id, item))
        .collect();

    let remote_ids: HashSet<&ItemId> = remote.items().iter().map(|item| &item.id).collect();

    let mut merged: Vec<ItemRecord> = local
        .items()
        .iter()
        .filter(|item| item.is_uploading() && !remote_ids.contains(&item.id))
        .cloned()
        .collect();

    let mut seen: HashSet<ItemId> = merged.iter().map(|item| item.id.clone()).collect();
    for item in remote.items() {
        if !seen.insert(item.id.clone()) {
            continue;
        }

        match in_flight.get(&item.id) {
            Some(local_item) => merged.push((*local_item).clone()),
            None => merged.push(item.clone()),
        }
    }

    let mut snapshot = remote;
    snapshot.set_items(merged);
    snapshot
}
