pub mod agent;
pub mod call;
pub mod queue_entry;

pub use agent::{Agent, AgentPresence, AgentProfile};
pub use call::{Call, CallStatus, EndedBy};
pub use queue_entry::QueueEntry;
