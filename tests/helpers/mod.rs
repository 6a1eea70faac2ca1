#![allow(dead_code)]
pub mod test_db;

pub use test_db::*;

use dialdesk::{
    Agent, AgentPresence, AgentProfile, DispatchOptions, Dispatcher, Directory,
    EventBroadcaster, Ledger, LedgerWriter, LedgerWriterHandle, LocalEventBroadcaster,
    RecordingBroadcaster,
};
use std::sync::Arc;
use std::time::Duration;

/// A dispatcher wired over a throwaway database, with handles to the pieces
/// tests poke at directly.
pub struct TestCore {
    pub dispatcher: Dispatcher,
    pub broadcaster: Arc<LocalEventBroadcaster>,
    pub writer: LedgerWriterHandle,
    pub test_db: TestDb,
}

pub async fn setup_core(options: DispatchOptions) -> TestCore {
    let test_db = setup_test_db().await;
    let db = test_db.db();

    let directory: Arc<dyn Directory> = Arc::new(db.clone());
    let ledger: Arc<dyn Ledger> = Arc::new(db);
    let broadcaster = Arc::new(LocalEventBroadcaster::new(256));
    let writer = LedgerWriter::spawn(ledger.clone());
    let dispatcher = Dispatcher::new(
        directory,
        ledger,
        broadcaster.clone() as Arc<dyn EventBroadcaster>,
        writer.clone(),
        options,
    );

    TestCore {
        dispatcher,
        broadcaster,
        writer,
        test_db,
    }
}

/// Same wiring as `setup_core`, but events land in a recorder instead of a
/// broadcast channel. Useful for exact ordering assertions.
pub struct RecordingCore {
    pub dispatcher: Dispatcher,
    pub recorder: Arc<RecordingBroadcaster>,
    pub writer: LedgerWriterHandle,
    pub test_db: TestDb,
}

pub async fn setup_recording_core(options: DispatchOptions) -> RecordingCore {
    let test_db = setup_test_db().await;
    let db = test_db.db();

    let directory: Arc<dyn Directory> = Arc::new(db.clone());
    let ledger: Arc<dyn Ledger> = Arc::new(db);
    let recorder = Arc::new(RecordingBroadcaster::new());
    let writer = LedgerWriter::spawn(ledger.clone());
    let dispatcher = Dispatcher::new(
        directory,
        ledger,
        recorder.clone() as Arc<dyn EventBroadcaster>,
        writer.clone(),
        options,
    );

    RecordingCore {
        dispatcher,
        recorder,
        writer,
        test_db,
    }
}

/// Dispatch options with the ring deadline disabled, so tests control every
/// transition explicitly.
pub fn no_ring_timeout() -> DispatchOptions {
    DispatchOptions {
        ring_timeout: Duration::ZERO,
        ..DispatchOptions::default()
    }
}

/// Register an agent and report them available in one step.
pub async fn seed_available_agent(dispatcher: &Dispatcher, agent_id: &str, priority: i32) -> Agent {
    dispatcher
        .register_agent(AgentProfile {
            agent_id: agent_id.to_string(),
            user_id: format!("user-{}", agent_id),
            priority,
            shift_start: None,
            shift_end: None,
        })
        .await
        .expect("Failed to register agent");
    dispatcher
        .set_agent_presence(agent_id, AgentPresence::Available)
        .await
        .expect("Failed to set agent available")
}
