//! Storage seams consumed by the chain builder and the ingestion
//! orchestrator. `Db` implements all three; tests wrap it to inject failures.

use procchain_types::{
    OwnerId, ProcessLink, QueryRecordView, RecordId, SnapshotId, SnapshotView,
};

use crate::db::{NewProcessRecord, NewQueryRecord, NewSnapshot};
use crate::error::StoreError;

pub trait SnapshotStore {
    fn create_snapshot(&self, snapshot: &NewSnapshot) -> Result<SnapshotView, StoreError>;

    /// Unscoped lookup; callers run the result through the authorization guard.
    fn get_snapshot(&self, id: SnapshotId) -> Result<SnapshotView, StoreError>;

    /// Sets the declared count. Matches only rows owned by `owner`.
    fn finalize_process_count(
        &self,
        id: SnapshotId,
        owner: OwnerId,
        process_count: u32,
    ) -> Result<SnapshotView, StoreError>;

    /// Adds one to the declared count. Matches only rows owned by `owner`.
    fn increment_process_count(
        &self,
        id: SnapshotId,
        owner: OwnerId,
    ) -> Result<SnapshotView, StoreError>;

    /// Flips the snapshot to failed with `error` and recounts its stored
    /// records. Matches only rows owned by `owner`.
    fn mark_snapshot_failed(
        &self,
        id: SnapshotId,
        owner: OwnerId,
        error: &str,
    ) -> Result<SnapshotView, StoreError>;
}

pub trait RecordStore {
    /// Persists one descriptor and returns the link payload other records use
    /// to point at it.
    fn insert_record(&self, record: &NewProcessRecord<'_>) -> Result<ProcessLink, StoreError>;

    fn set_next_link(&self, record: RecordId, next: &ProcessLink) -> Result<(), StoreError>;

    fn set_previous_link(&self, record: RecordId, previous: &ProcessLink)
    -> Result<(), StoreError>;
}

pub trait QueryStore {
    fn insert_query(&self, query: &NewQueryRecord) -> Result<QueryRecordView, StoreError>;
}
