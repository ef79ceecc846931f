use serde::{Deserialize, Serialize};

use crate::{OwnerId, ProcessInfo, QueryId, RecordId, SnapshotId, SnapshotKind};

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: String,
    pub error: String,
}

/// Body of `POST /api/v1/webhook/process-by-pid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessByPidBody {
    pub pid: i64,
    #[serde(default)]
    pub snapshot_id: Option<SnapshotId>,
}

/// Cached summary of the record on the other side of an adjacency link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessLink {
    pub record_id: RecordId,
    pub address: String,
    pub process_name: String,
    pub process_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotView {
    pub id: SnapshotId,
    pub owner_id: Option<OwnerId>,
    pub source_url: String,
    pub kind: SnapshotKind,
    pub process_count: u32,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecordView {
    pub id: RecordId,
    pub snapshot_id: SnapshotId,
    pub owner_id: Option<OwnerId>,
    /// Index in the order the agent emitted the process.
    pub position: u32,
    pub process: ProcessInfo,
    pub next_process: Option<ProcessLink>,
    pub previous_process: Option<ProcessLink>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecordView {
    pub id: QueryId,
    pub snapshot_id: Option<SnapshotId>,
    pub owner_id: Option<OwnerId>,
    pub source_url: String,
    pub requested_pid: u32,
    pub process_record_id: Option<RecordId>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    /// Embedded only by the query-history endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<ProcessRecordView>,
}

/// Result of an enumeration ingestion. `snapshot` is absent for anonymous
/// callers, whose data is never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationOutcome {
    pub snapshot: Option<SnapshotView>,
    pub received: u32,
    pub persisted: u32,
    pub skipped: u32,
    pub broken_links: u32,
    pub record_ids: Vec<RecordId>,
    pub processes: Vec<ProcessInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    pub snapshot: Option<SnapshotView>,
    pub query: Option<QueryRecordView>,
    pub record_id: Option<RecordId>,
    pub process: ProcessInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotProcessesResponse {
    pub snapshot: SnapshotView,
    pub processes: Vec<ProcessRecordView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotQueriesResponse {
    pub snapshot: SnapshotView,
    pub queries: Vec<QueryRecordView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MostQueriedProcess {
    pub process_id: u32,
    pub process_name: String,
    pub query_count: u64,
    pub last_queried_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotOutcomeCounts {
    pub kind: SnapshotKind,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsResponse {
    pub total_processes: u64,
    pub total_snapshots: u64,
    pub total_queries: u64,
    pub most_queried_processes: Vec<MostQueriedProcess>,
    pub snapshot_outcomes: Vec<SnapshotOutcomeCounts>,
}
