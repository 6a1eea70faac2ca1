pub mod agent_registry;
pub mod call_queue;
pub mod dispatcher;
pub mod ledger_writer;
pub mod state_machine;

pub use agent_registry::AgentRegistry;
pub use call_queue::CallQueue;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use ledger_writer::{LedgerCommand, LedgerWriter, LedgerWriterHandle};
pub use state_machine::{validate_transition, TransitionError};
