pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::services::{
    validate_transition, AgentRegistry, CallQueue, DispatchOutcome, Dispatcher, LedgerCommand,
    LedgerWriter, LedgerWriterHandle, TransitionError,
};
pub use bootstrap::build_dispatcher;
pub use config::{Config, ConfigError, DispatchOptions};
pub use domain::entities::{Agent, AgentPresence, AgentProfile, Call, CallStatus, EndedBy, QueueEntry};
pub use domain::errors::{DispatchError, DispatchResult};
pub use domain::ports::{
    CallHistoryPage, CustomerSummary, Directory, Ledger, PaginationMetadata, UserSummary,
};
pub use infrastructure::persistence::Database;
pub use shared::events::{
    DashboardSnapshot, DispatchEvent, EventBroadcaster, EventStream, LocalEventBroadcaster,
    RecordingBroadcaster, Topic,
};
