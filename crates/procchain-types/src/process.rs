use serde::{Deserialize, Serialize};

/// One OS process as reported by the agent.
///
/// Byte counters and cumulative times may arrive either as JSON numbers or as
/// numeric strings; both decode to `u64`. Any kernel list pointers the agent
/// attaches (`nextProcess`, `previousProcess`) are ignored: stored adjacency
/// always reflects the persisted chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub process_id: u32,
    #[serde(default)]
    pub parent_process_id: u32,
    pub process_name: String,
    #[serde(default)]
    pub thread_count: u32,
    #[serde(default)]
    pub handle_count: u32,
    #[serde(default)]
    pub base_priority: i32,
    #[serde(default)]
    pub create_time: String,
    #[serde(default, deserialize_with = "lenient::counter")]
    pub user_time: u64,
    #[serde(default, deserialize_with = "lenient::counter")]
    pub kernel_time: u64,
    #[serde(default, deserialize_with = "lenient::counter")]
    pub working_set_size: u64,
    #[serde(default, deserialize_with = "lenient::counter")]
    pub peak_working_set_size: u64,
    #[serde(default, deserialize_with = "lenient::counter")]
    pub virtual_size: u64,
    #[serde(default, deserialize_with = "lenient::counter")]
    pub peak_virtual_size: u64,
    #[serde(default, deserialize_with = "lenient::counter")]
    pub pagefile_usage: u64,
    #[serde(default, deserialize_with = "lenient::counter")]
    pub peak_pagefile_usage: u64,
    #[serde(default)]
    pub page_fault_count: u32,
    #[serde(default, deserialize_with = "lenient::counter")]
    pub read_operation_count: u64,
    #[serde(default, deserialize_with = "lenient::counter")]
    pub write_operation_count: u64,
    #[serde(default, deserialize_with = "lenient::counter")]
    pub other_operation_count: u64,
    #[serde(default, deserialize_with = "lenient::counter")]
    pub read_transfer_count: u64,
    #[serde(default, deserialize_with = "lenient::counter")]
    pub write_transfer_count: u64,
    #[serde(default, deserialize_with = "lenient::counter")]
    pub other_transfer_count: u64,
    #[serde(default)]
    pub current_process_address: String,
}

impl ProcessInfo {
    /// A descriptor with only identity fields set.
    pub fn named(process_id: u32, process_name: impl Into<String>) -> Self {
        Self {
            process_id,
            parent_process_id: 0,
            process_name: process_name.into(),
            thread_count: 0,
            handle_count: 0,
            base_priority: 0,
            create_time: String::new(),
            user_time: 0,
            kernel_time: 0,
            working_set_size: 0,
            peak_working_set_size: 0,
            virtual_size: 0,
            peak_virtual_size: 0,
            pagefile_usage: 0,
            peak_pagefile_usage: 0,
            page_fault_count: 0,
            read_operation_count: 0,
            write_operation_count: 0,
            other_operation_count: 0,
            read_transfer_count: 0,
            write_transfer_count: 0,
            other_transfer_count: 0,
            current_process_address: String::new(),
        }
    }
}

mod lenient {
    use serde::Deserialize;
    use serde::de::{self, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        Text(String),
    }

    /// Values above `i64::MAX` are refused. Storage keeps counters in signed
    /// 64-bit columns.
    pub(super) fn counter<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(value) => value,
            NumberOrString::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(0);
                }
                trimmed.parse::<u64>().map_err(|error| {
                    de::Error::custom(format!("invalid counter {trimmed:?}: {error}"))
                })?
            }
        };
        if i64::try_from(value).is_err() {
            return Err(de::Error::custom(format!(
                "counter {value} exceeds {}",
                i64::MAX
            )));
        }
        Ok(value)
    }
}
