use std::time::Duration;

use procchain_types::{
    ITERATE_PROCESSES_PATH, IterateProcessesResponse, PROCESS_BY_PID_PATH, ProcessByPidRequest,
    ProcessByPidResponse, ProcessInfo,
};
use tracing::debug;

use crate::error::ServiceError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ERROR_BODY_CHARS: usize = 512;

/// The agent that reports processes. Calls block; run them off the runtime.
pub trait ProcessSource {
    /// Full enumeration, in the order the agent walked its process list.
    fn iterate(&self, base_url: &str) -> Result<Vec<ProcessInfo>, ServiceError>;

    fn by_pid(&self, base_url: &str, pid: u32) -> Result<ProcessInfo, ServiceError>;
}

#[derive(Clone)]
pub struct HttpProcessSource {
    agent: ureq::Agent,
}

impl HttpProcessSource {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build();
        Self { agent }
    }

    fn post_json(&self, url: &str, body: &str) -> Result<String, ServiceError> {
        let resp = match self
            .agent
            .post(url)
            .set("Content-Type", "application/json")
            .send_string(body)
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                return Err(ServiceError::Upstream(format!(
                    "{url} answered HTTP {code}: {}",
                    clip(&text)
                )));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(ServiceError::Upstream(format!("request to {url} failed: {err}")));
            }
        };
        resp.into_string()
            .map_err(|e| ServiceError::Upstream(format!("failed reading body from {url}: {e}")))
    }
}

impl ProcessSource for HttpProcessSource {
    fn iterate(&self, base_url: &str) -> Result<Vec<ProcessInfo>, ServiceError> {
        let url = endpoint(base_url, ITERATE_PROCESSES_PATH);
        let body = self.post_json(&url, "{}")?;
        decode_iteration(&body)
    }

    fn by_pid(&self, base_url: &str, pid: u32) -> Result<ProcessInfo, ServiceError> {
        let url = endpoint(base_url, PROCESS_BY_PID_PATH);
        let request = serde_json::to_string(&ProcessByPidRequest { pid })
            .map_err(|e| ServiceError::Validation(format!("encode pid request: {e}")))?;
        let body = self.post_json(&url, &request)?;
        decode_process_by_pid(&body, pid)
    }
}

pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}

pub fn decode_iteration(body: &str) -> Result<Vec<ProcessInfo>, ServiceError> {
    let envelope: IterateProcessesResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::Decode(format!("iterate-processes response: {e}")))?;
    if !envelope.success {
        return Err(ServiceError::Upstream(
            envelope
                .error
                .unwrap_or_else(|| String::from("agent reported an unsuccessful enumeration")),
        ));
    }
    if envelope.process_count as usize != envelope.processes.len() {
        debug!(
            declared = envelope.process_count,
            received = envelope.processes.len(),
            "agent process count differs from list length"
        );
    }
    Ok(envelope.processes)
}

pub fn decode_process_by_pid(body: &str, pid: u32) -> Result<ProcessInfo, ServiceError> {
    let envelope: ProcessByPidResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::Decode(format!("process-by-pid response: {e}")))?;
    if !envelope.success {
        return Err(ServiceError::Upstream(
            envelope
                .error
                .unwrap_or_else(|| format!("agent could not report process {pid}")),
        ));
    }
    envelope.process_info.ok_or_else(|| {
        ServiceError::Decode(String::from(
            "process-by-pid response is successful but has no processInfo",
        ))
    })
}

fn clip(text: &str) -> &str {
    match text.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
