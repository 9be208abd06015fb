use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ProcessRecord, format_timestamp};

/// Body of a delivery request, sent by the agent once per cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub hostname: String,
    /// Capture time, see [`format_timestamp`]
    pub timestamp: String,
    pub processes: Vec<ProcessRecord>,
    pub api_key: String,
}

impl SnapshotPayload {
    pub fn new(
        hostname: impl Into<String>,
        captured_at: DateTime<Utc>,
        processes: Vec<ProcessRecord>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            timestamp: format_timestamp(&captured_at),
            processes,
            api_key: api_key.into(),
        }
    }
}

/// Successful ingestion response.
///
/// `message` is informational only, the HTTP status is what signals success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub status: String,
    pub message: String,
    pub snapshot_id: i64,
}

impl IngestReceipt {
    pub fn success(snapshot_id: i64, process_count: usize) -> Self {
        Self {
            status: "success".into(),
            message: format!("Processed {process_count} processes"),
            snapshot_id,
        }
    }
}

/// Body of every 4xx/5xx response of the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub details: serde_json::Value,
}
