use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A waiting call's slot in the dispatch queue. Positions are 1-based and
/// recomputed on every queue mutation so they always match the current order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub call_id: String,
    pub caller_number: String,
    pub priority: i32,
    pub position: i64,
    #[serde(rename = "estimatedWaitTime")]
    pub estimated_wait_secs: i64,
    pub queued_at: DateTime<Utc>,
}
