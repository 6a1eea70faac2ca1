use crate::domain::entities::{Agent, Call, QueueEntry};
use crate::domain::errors::DispatchResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMetadata {
    pub page: i64,
    pub per_page: i64,
    pub total_count: i64,
    pub total_pages: i64,
}

/// One page of the persisted call history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHistoryPage {
    pub calls: Vec<Call>,
    pub pagination: PaginationMetadata,
}

/// Durable store for call/agent/queue records. The in-memory dispatch tables
/// stay authoritative; writes here are write-through side effects performed
/// out of band, reads serve the history surface.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Upsert a call record keyed by call id.
    async fn save_call(&self, call: &Call) -> DispatchResult<()>;
    /// Upsert an agent row keyed by agent id.
    async fn save_agent(&self, agent: &Agent) -> DispatchResult<()>;
    /// Replace the persisted queue with the given ordered snapshot.
    async fn replace_queue(&self, entries: &[QueueEntry]) -> DispatchResult<()>;
    /// Page through stored calls, newest first. Returns the page plus the
    /// total row count.
    async fn call_history(&self, page: i64, per_page: i64) -> DispatchResult<(Vec<Call>, i64)>;
}
