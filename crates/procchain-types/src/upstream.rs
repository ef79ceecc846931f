use serde::{Deserialize, Serialize};

use crate::ProcessInfo;

/// Path appended to the agent base URL for a full enumeration.
pub const ITERATE_PROCESSES_PATH: &str = "/webhook/iterate-processes";
/// Path appended to the agent base URL for a single-pid lookup.
pub const PROCESS_BY_PID_PATH: &str = "/webhook/process-by-pid";

/// Agent reply to an enumeration request. `processes` is in scan order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterateProcessesResponse {
    pub success: bool,
    #[serde(default)]
    pub process_count: u32,
    #[serde(default)]
    pub processes: Vec<ProcessInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessByPidRequest {
    pub pid: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessByPidResponse {
    pub success: bool,
    #[serde(default)]
    pub process_info: Option<ProcessInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
