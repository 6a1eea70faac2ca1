mod helpers;

use dialdesk::{
    AgentPresence, CallStatus, DispatchError, DispatchOptions, DispatchOutcome, EndedBy,
};
use helpers::*;
use std::time::Duration;

#[tokio::test]
async fn test_direct_assignment_full_lifecycle() {
    let core = setup_core(no_ring_timeout()).await;
    seed_available_agent(&core.dispatcher, "agent-1", 1).await;

    // Intake: one available agent, so the call rings immediately.
    let outcome = core
        .dispatcher
        .initiate_call("0901234567", None)
        .await
        .expect("Failed to initiate call");
    let (call, agent) = match outcome {
        DispatchOutcome::Assigned { call, agent } => (call, agent),
        other => panic!("Expected direct assignment, got {:?}", other),
    };
    assert_eq!(call.status, CallStatus::Ringing);
    assert_eq!(call.agent_id.as_deref(), Some("agent-1"));
    assert_eq!(call.called_number, "1900");
    assert_eq!(call.customer_id.as_deref(), Some("cust-001"));
    assert_eq!(agent.status, AgentPresence::OnCall);
    assert_eq!(agent.current_call_id.as_deref(), Some(call.id.as_str()));

    // Pickup timestamps the call and fixes the queue time.
    let answered = core
        .dispatcher
        .answer_call(&call.id, "agent-1")
        .await
        .expect("Failed to answer call");
    assert_eq!(answered.status, CallStatus::Connected);
    assert!(answered.answer_time.is_some());
    assert!(answered.queue_time_secs >= 0);

    // Hang-up fixes end-of-call timings and frees the agent.
    let ended = core
        .dispatcher
        .end_call(&call.id, EndedBy::Agent)
        .await
        .expect("Failed to end call");
    assert_eq!(ended.status, CallStatus::Ended);
    assert!(ended.end_time.is_some());
    assert!(ended.talk_duration_secs >= 0);

    let agent = core
        .dispatcher
        .get_agent("agent-1")
        .await
        .expect("Agent should exist");
    assert_eq!(agent.status, AgentPresence::Available);
    assert_eq!(agent.current_call_id, None);
    assert_eq!(agent.total_calls, 1);

    // Terminal calls leave the active set but stay queryable.
    assert!(core.dispatcher.active_calls().await.is_empty());
    assert!(core.dispatcher.get_call(&call.id).await.is_some());

    teardown_test_db(core.test_db).await;
}

#[tokio::test]
async fn test_answer_requires_ringing_call() {
    let core = setup_core(no_ring_timeout()).await;
    // Registered but offline: the call queues instead of ringing.
    core.dispatcher
        .register_agent(dialdesk::AgentProfile {
            agent_id: "agent-1".to_string(),
            user_id: "user-agent-1".to_string(),
            priority: 1,
            shift_start: None,
            shift_end: None,
        })
        .await
        .expect("Failed to register agent");

    let outcome = core
        .dispatcher
        .initiate_call("0901234567", None)
        .await
        .expect("Failed to initiate call");
    let call = match outcome {
        DispatchOutcome::Queued { call, .. } => call,
        other => panic!("Expected queued call, got {:?}", other),
    };

    let err = core
        .dispatcher
        .answer_call(&call.id, "agent-1")
        .await
        .expect_err("Answering a queued call must fail");
    assert!(matches!(err, DispatchError::InvalidState(_)));

    teardown_test_db(core.test_db).await;
}

#[tokio::test]
async fn test_unknown_ids_are_not_found_and_leave_state_untouched() {
    let core = setup_core(no_ring_timeout()).await;
    seed_available_agent(&core.dispatcher, "agent-1", 1).await;
    let before = core.dispatcher.agents().await;

    let err = core
        .dispatcher
        .end_call("CALL_00000000", EndedBy::Agent)
        .await
        .expect_err("Ending an unknown call must fail");
    assert!(matches!(err, DispatchError::NotFound(_)));

    let err = core
        .dispatcher
        .answer_call("CALL_00000000", "agent-1")
        .await
        .expect_err("Answering an unknown call must fail");
    assert!(matches!(err, DispatchError::NotFound(_)));

    let after = core.dispatcher.agents().await;
    assert_eq!(before.len(), after.len());
    assert_eq!(before[0].status, after[0].status);
    assert_eq!(before[0].total_calls, after[0].total_calls);

    teardown_test_db(core.test_db).await;
}

#[tokio::test]
async fn test_answer_with_unknown_agent_is_not_found() {
    let core = setup_core(no_ring_timeout()).await;
    seed_available_agent(&core.dispatcher, "agent-1", 1).await;

    let outcome = core
        .dispatcher
        .initiate_call("0901234567", None)
        .await
        .expect("Failed to initiate call");
    let call = match outcome {
        DispatchOutcome::Assigned { call, .. } => call,
        other => panic!("Expected assignment, got {:?}", other),
    };

    let err = core
        .dispatcher
        .answer_call(&call.id, "agent-ghost")
        .await
        .expect_err("Unknown agent must fail");
    assert!(matches!(err, DispatchError::NotFound(_)));

    teardown_test_db(core.test_db).await;
}

#[tokio::test]
async fn test_ending_twice_is_invalid_state() {
    let core = setup_core(no_ring_timeout()).await;
    seed_available_agent(&core.dispatcher, "agent-1", 1).await;

    let outcome = core
        .dispatcher
        .initiate_call("0912345678", None)
        .await
        .expect("Failed to initiate call");
    let call = match outcome {
        DispatchOutcome::Assigned { call, .. } => call,
        other => panic!("Expected assignment, got {:?}", other),
    };
    core.dispatcher
        .answer_call(&call.id, "agent-1")
        .await
        .expect("Failed to answer call");
    core.dispatcher
        .end_call(&call.id, EndedBy::Caller)
        .await
        .expect("Failed to end call");

    let err = core
        .dispatcher
        .end_call(&call.id, EndedBy::Caller)
        .await
        .expect_err("Second hang-up must fail");
    assert!(matches!(err, DispatchError::InvalidState(_)));

    teardown_test_db(core.test_db).await;
}

#[tokio::test]
async fn test_missing_caller_number_is_invalid_input() {
    let core = setup_core(no_ring_timeout()).await;

    let err = core
        .dispatcher
        .initiate_call("  ", None)
        .await
        .expect_err("Blank caller number must fail");
    assert!(matches!(err, DispatchError::InvalidInput(_)));

    teardown_test_db(core.test_db).await;
}

#[tokio::test]
async fn test_unknown_caller_routes_without_customer() {
    let core = setup_core(no_ring_timeout()).await;
    seed_available_agent(&core.dispatcher, "agent-1", 1).await;

    let outcome = core
        .dispatcher
        .initiate_call("0999999999", Some("1800"))
        .await
        .expect("Failed to initiate call");
    let call = match outcome {
        DispatchOutcome::Assigned { call, .. } => call,
        other => panic!("Expected assignment, got {:?}", other),
    };
    assert_eq!(call.customer_id, None);
    assert_eq!(call.called_number, "1800");

    teardown_test_db(core.test_db).await;
}

#[tokio::test]
async fn test_hold_and_resume() {
    let core = setup_core(no_ring_timeout()).await;
    seed_available_agent(&core.dispatcher, "agent-1", 1).await;

    let outcome = core
        .dispatcher
        .initiate_call("0901234567", None)
        .await
        .expect("Failed to initiate call");
    let call = match outcome {
        DispatchOutcome::Assigned { call, .. } => call,
        other => panic!("Expected assignment, got {:?}", other),
    };

    // A ringing call cannot be parked.
    let err = core
        .dispatcher
        .hold_call(&call.id)
        .await
        .expect_err("Holding a ringing call must fail");
    assert!(matches!(err, DispatchError::InvalidState(_)));

    core.dispatcher
        .answer_call(&call.id, "agent-1")
        .await
        .expect("Failed to answer call");

    let held = core
        .dispatcher
        .hold_call(&call.id)
        .await
        .expect("Failed to hold call");
    assert_eq!(held.status, CallStatus::OnHold);

    let err = core
        .dispatcher
        .hold_call(&call.id)
        .await
        .expect_err("Double hold must fail");
    assert!(matches!(err, DispatchError::InvalidState(_)));

    let resumed = core
        .dispatcher
        .resume_call(&call.id)
        .await
        .expect("Failed to resume call");
    assert_eq!(resumed.status, CallStatus::Connected);

    // A held call can still be ended.
    core.dispatcher
        .hold_call(&call.id)
        .await
        .expect("Failed to hold call");
    let ended = core
        .dispatcher
        .end_call(&call.id, EndedBy::Caller)
        .await
        .expect("Failed to end held call");
    assert_eq!(ended.status, CallStatus::Ended);

    teardown_test_db(core.test_db).await;
}

#[tokio::test]
async fn test_transfer_moves_call_and_frees_previous_agent() {
    let core = setup_core(no_ring_timeout()).await;
    seed_available_agent(&core.dispatcher, "agent-1", 1).await;

    let outcome = core
        .dispatcher
        .initiate_call("0901234567", None)
        .await
        .expect("Failed to initiate call");
    let call = match outcome {
        DispatchOutcome::Assigned { call, .. } => call,
        other => panic!("Expected assignment, got {:?}", other),
    };
    core.dispatcher
        .answer_call(&call.id, "agent-1")
        .await
        .expect("Failed to answer call");

    seed_available_agent(&core.dispatcher, "agent-2", 1).await;

    let transferred = core
        .dispatcher
        .transfer_call(&call.id, "agent-2")
        .await
        .expect("Failed to transfer call");
    assert_eq!(transferred.status, CallStatus::Connected);
    assert_eq!(transferred.agent_id.as_deref(), Some("agent-2"));

    let previous = core
        .dispatcher
        .get_agent("agent-1")
        .await
        .expect("Agent should exist");
    assert_eq!(previous.status, AgentPresence::Available);
    assert_eq!(previous.current_call_id, None);

    let target = core
        .dispatcher
        .get_agent("agent-2")
        .await
        .expect("Agent should exist");
    assert_eq!(target.status, AgentPresence::OnCall);
    assert_eq!(target.current_call_id.as_deref(), Some(call.id.as_str()));

    // Stats accrue only at hang-up, and only to the final handler.
    core.dispatcher
        .end_call(&call.id, EndedBy::Agent)
        .await
        .expect("Failed to end call");
    let previous = core.dispatcher.get_agent("agent-1").await.unwrap();
    let target = core.dispatcher.get_agent("agent-2").await.unwrap();
    assert_eq!(previous.total_calls, 0);
    assert_eq!(target.total_calls, 1);

    teardown_test_db(core.test_db).await;
}

#[tokio::test]
async fn test_transfer_requires_available_target() {
    let core = setup_core(no_ring_timeout()).await;
    seed_available_agent(&core.dispatcher, "agent-1", 1).await;

    let outcome = core
        .dispatcher
        .initiate_call("0901234567", None)
        .await
        .expect("Failed to initiate call");
    let call = match outcome {
        DispatchOutcome::Assigned { call, .. } => call,
        other => panic!("Expected assignment, got {:?}", other),
    };
    core.dispatcher
        .answer_call(&call.id, "agent-1")
        .await
        .expect("Failed to answer call");

    // Registered but away.
    seed_available_agent(&core.dispatcher, "agent-2", 1).await;
    core.dispatcher
        .set_agent_presence("agent-2", AgentPresence::Away)
        .await
        .expect("Failed to set presence");

    let err = core
        .dispatcher
        .transfer_call(&call.id, "agent-2")
        .await
        .expect_err("Transfer to a non-available agent must fail");
    assert!(matches!(err, DispatchError::InvalidState(_)));

    // Transfer back to the current handler is rejected too.
    let err = core
        .dispatcher
        .transfer_call(&call.id, "agent-1")
        .await
        .expect_err("Transfer to the current handler must fail");
    assert!(matches!(err, DispatchError::InvalidState(_)));

    // Unknown target.
    let err = core
        .dispatcher
        .transfer_call(&call.id, "agent-ghost")
        .await
        .expect_err("Transfer to an unknown agent must fail");
    assert!(matches!(err, DispatchError::NotFound(_)));

    teardown_test_db(core.test_db).await;
}

#[tokio::test]
async fn test_append_note_accumulates_wrapup_text() {
    let core = setup_core(no_ring_timeout()).await;
    seed_available_agent(&core.dispatcher, "agent-1", 1).await;

    let outcome = core
        .dispatcher
        .initiate_call("0901234567", None)
        .await
        .expect("Failed to initiate call");
    let call = match outcome {
        DispatchOutcome::Assigned { call, .. } => call,
        other => panic!("Expected assignment, got {:?}", other),
    };
    core.dispatcher
        .answer_call(&call.id, "agent-1")
        .await
        .expect("Failed to answer call");
    core.dispatcher
        .end_call(&call.id, EndedBy::Agent)
        .await
        .expect("Failed to end call");

    // Wrap-up notes land after the hang-up and accumulate line by line.
    let noted = core
        .dispatcher
        .append_note(&call.id, "Asked about card limit")
        .await
        .expect("Failed to append note");
    assert_eq!(noted.notes.as_deref(), Some("Asked about card limit"));

    let noted = core
        .dispatcher
        .append_note(&call.id, "Escalated to branch")
        .await
        .expect("Failed to append second note");
    assert_eq!(
        noted.notes.as_deref(),
        Some("Asked about card limit\nEscalated to branch")
    );

    let err = core
        .dispatcher
        .append_note(&call.id, "   ")
        .await
        .expect_err("Blank note must fail");
    assert!(matches!(err, DispatchError::InvalidInput(_)));

    let err = core
        .dispatcher
        .append_note("CALL_00000000", "text")
        .await
        .expect_err("Unknown call must fail");
    assert!(matches!(err, DispatchError::NotFound(_)));

    teardown_test_db(core.test_db).await;
}

#[tokio::test]
async fn test_ring_timeout_marks_call_missed_and_frees_agent() {
    let options = DispatchOptions {
        ring_timeout: Duration::from_millis(100),
        ..DispatchOptions::default()
    };
    let core = setup_core(options).await;
    seed_available_agent(&core.dispatcher, "agent-1", 1).await;

    let outcome = core
        .dispatcher
        .initiate_call("0901234567", None)
        .await
        .expect("Failed to initiate call");
    let call = match outcome {
        DispatchOutcome::Assigned { call, .. } => call,
        other => panic!("Expected assignment, got {:?}", other),
    };

    tokio::time::sleep(Duration::from_millis(350)).await;

    let missed = core
        .dispatcher
        .get_call(&call.id)
        .await
        .expect("Call should exist");
    assert_eq!(missed.status, CallStatus::Missed);
    // Missed calls never reached an agent, so no end timestamp.
    assert_eq!(missed.end_time, None);

    let agent = core
        .dispatcher
        .get_agent("agent-1")
        .await
        .expect("Agent should exist");
    assert_eq!(agent.status, AgentPresence::Available);
    assert_eq!(agent.current_call_id, None);

    teardown_test_db(core.test_db).await;
}

#[tokio::test]
async fn test_answer_in_time_outruns_ring_timeout() {
    let options = DispatchOptions {
        ring_timeout: Duration::from_millis(150),
        ..DispatchOptions::default()
    };
    let core = setup_core(options).await;
    seed_available_agent(&core.dispatcher, "agent-1", 1).await;

    let outcome = core
        .dispatcher
        .initiate_call("0901234567", None)
        .await
        .expect("Failed to initiate call");
    let call = match outcome {
        DispatchOutcome::Assigned { call, .. } => call,
        other => panic!("Expected assignment, got {:?}", other),
    };
    core.dispatcher
        .answer_call(&call.id, "agent-1")
        .await
        .expect("Failed to answer call");

    // Let the stale timer fire; it must not touch the connected call.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let connected = core
        .dispatcher
        .get_call(&call.id)
        .await
        .expect("Call should exist");
    assert_eq!(connected.status, CallStatus::Connected);

    let agent = core
        .dispatcher
        .get_agent("agent-1")
        .await
        .expect("Agent should exist");
    assert_eq!(agent.status, AgentPresence::OnCall);

    teardown_test_db(core.test_db).await;
}

#[tokio::test]
async fn test_ring_timeout_hands_agent_to_queue_head() {
    let options = DispatchOptions {
        ring_timeout: Duration::from_millis(200),
        ..DispatchOptions::default()
    };
    let core = setup_core(options).await;
    seed_available_agent(&core.dispatcher, "agent-1", 1).await;

    // First call rings on the only agent; second call queues.
    let first = core
        .dispatcher
        .initiate_call("0901234567", None)
        .await
        .expect("Failed to initiate first call");
    let first_call = match first {
        DispatchOutcome::Assigned { call, .. } => call,
        other => panic!("Expected assignment, got {:?}", other),
    };
    let second = core
        .dispatcher
        .initiate_call("0912345678", None)
        .await
        .expect("Failed to initiate second call");
    let second_call = match second {
        DispatchOutcome::Queued { call, .. } => call,
        other => panic!("Expected queued call, got {:?}", other),
    };

    // Check between the first ring deadline (200ms) and the second (400ms):
    // the first call has gone missed and the freed agent rings on the
    // queued one.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let first_state = core.dispatcher.get_call(&first_call.id).await.unwrap();
    assert_eq!(first_state.status, CallStatus::Missed);

    let second_state = core.dispatcher.get_call(&second_call.id).await.unwrap();
    assert_eq!(second_state.status, CallStatus::Ringing);
    assert_eq!(second_state.agent_id.as_deref(), Some("agent-1"));
    assert!(core.dispatcher.queue_snapshot().await.is_empty());

    teardown_test_db(core.test_db).await;
}
