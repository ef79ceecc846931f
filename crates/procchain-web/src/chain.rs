//! Folds an ordered enumeration into persisted records and links each record
//! to its neighbours as it goes.
//!
//! The fold never aborts: a descriptor that fails to persist is skipped and
//! the chain closes over the gap, and a failed adjacency write leaves that
//! one edge asymmetric.

use std::collections::{HashMap, HashSet};

use procchain_types::{OwnerId, ProcessInfo, ProcessLink, ProcessRecordView, RecordId, SnapshotId};
use tracing::{debug, warn};

use crate::db::{NewProcessRecord, RecordStore};
use crate::error::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainOutcome {
    /// Ids of persisted records, in input order.
    pub persisted: Vec<RecordId>,
    pub skipped: u32,
    /// Adjacency writes that failed and were left unpatched.
    pub broken_links: u32,
}

impl ChainOutcome {
    pub fn persisted_count(&self) -> u32 {
        u32::try_from(self.persisted.len()).unwrap_or(u32::MAX)
    }
}

/// Stores one descriptor without touching any adjacency. `None` appends it
/// after the snapshot's last record.
pub fn persist_descriptor<S: RecordStore + ?Sized>(
    store: &S,
    snapshot_id: SnapshotId,
    owner_id: Option<OwnerId>,
    position: Option<u32>,
    process: &ProcessInfo,
) -> Result<ProcessLink, StoreError> {
    store.insert_record(&NewProcessRecord {
        snapshot_id,
        owner_id,
        position,
        process,
    })
}

pub fn fold_chain<S: RecordStore + ?Sized>(
    store: &S,
    snapshot_id: SnapshotId,
    owner_id: Option<OwnerId>,
    processes: &[ProcessInfo],
) -> ChainOutcome {
    let mut outcome = ChainOutcome::default();
    let mut cursor: Option<ProcessLink> = None;

    for (index, process) in processes.iter().enumerate() {
        let position = u32::try_from(index).unwrap_or(u32::MAX);
        let persisted = persist_descriptor(store, snapshot_id, owner_id, Some(position), process);
        let link = match persisted {
            Ok(link) => link,
            Err(e) => {
                warn!(
                    snapshot_id = %snapshot_id,
                    pid = process.process_id,
                    position,
                    %e,
                    "failed to persist process record, skipping"
                );
                outcome.skipped += 1;
                continue;
            }
        };

        if let Some(previous) = cursor.take() {
            if let Err(e) = store.set_next_link(previous.record_id, &link) {
                warn!(
                    snapshot_id = %snapshot_id,
                    record_id = %previous.record_id,
                    next_record_id = %link.record_id,
                    %e,
                    "failed to write next link"
                );
                outcome.broken_links += 1;
            }
            if let Err(e) = store.set_previous_link(link.record_id, &previous) {
                warn!(
                    snapshot_id = %snapshot_id,
                    record_id = %link.record_id,
                    previous_record_id = %previous.record_id,
                    %e,
                    "failed to write previous link"
                );
                outcome.broken_links += 1;
            }
        }

        outcome.persisted.push(link.record_id);
        cursor = Some(link);
    }

    debug!(
        snapshot_id = %snapshot_id,
        received = processes.len(),
        persisted = outcome.persisted.len(),
        skipped = outcome.skipped,
        broken_links = outcome.broken_links,
        "chain folded"
    );
    outcome
}

/// Orders the records of one snapshot by walking `next` links from each head.
///
/// A head is a record whose `previous` is empty or points outside `records`.
/// Records no walk reaches (cycles, broken back-links) are appended in
/// position order.
pub fn traverse(mut records: Vec<ProcessRecordView>) -> Vec<ProcessRecordView> {
    records.sort_by_key(|record| (record.position, record.id));

    let index: HashMap<RecordId, usize> = records
        .iter()
        .enumerate()
        .map(|(slot, record)| (record.id, slot))
        .collect();
    let is_head = |record: &ProcessRecordView| match &record.previous_process {
        None => true,
        Some(link) => !index.contains_key(&link.record_id),
    };

    let mut visited = HashSet::with_capacity(records.len());
    let mut order = Vec::with_capacity(records.len());
    for start in 0..records.len() {
        if !is_head(&records[start]) {
            continue;
        }
        let mut slot = Some(start);
        while let Some(current) = slot {
            if !visited.insert(current) {
                break;
            }
            order.push(current);
            slot = records[current]
                .next_process
                .as_ref()
                .and_then(|link| index.get(&link.record_id).copied());
        }
    }
    order.extend((0..records.len()).filter(|slot| !visited.contains(slot)));

    let mut slots: Vec<Option<ProcessRecordView>> = records.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|slot| slots[slot].take())
        .collect()
}
