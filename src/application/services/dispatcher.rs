use crate::application::services::agent_registry::AgentRegistry;
use crate::application::services::call_queue::CallQueue;
use crate::application::services::ledger_writer::{LedgerCommand, LedgerWriterHandle};
use crate::application::services::state_machine::validate_transition;
use crate::config::DispatchOptions;
use crate::domain::entities::{
    Agent, AgentPresence, AgentProfile, Call, CallStatus, EndedBy, QueueEntry,
};
use crate::domain::errors::{DispatchError, DispatchResult};
use crate::domain::ports::{
    CallHistoryPage, Directory, Ledger, PaginationMetadata, UserSummary,
};
use crate::shared::events::{
    DashboardSnapshot, DispatchEvent, EventBroadcaster, EventStream, Topic,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Hotline number substituted when a call arrives without a dialed number.
const HOTLINE_NUMBER: &str = "1900";

/// Priority granted to calls queued by the standard intake path.
const DEFAULT_QUEUE_PRIORITY: i32 = 1;

/// How an inbound call was settled by intake.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DispatchOutcome {
    /// An agent was available; the call is ringing on their extension.
    #[serde(rename = "ringing")]
    Assigned { call: Call, agent: Agent },
    /// No agent free; the call holds a queue slot.
    #[serde(rename = "queued")]
    Queued { call: Call, entry: QueueEntry },
    /// No agent free and the queue is at capacity; the caller hears busy.
    #[serde(rename = "busy")]
    Rejected { call: Call },
}

/// Everything the dispatcher guards with its single write lock. No call,
/// agent or queue mutation happens outside this struct.
struct DispatchState {
    calls: HashMap<String, Call>,
    registry: AgentRegistry,
    queue: CallQueue,
    /// Monotonic tokens for pending ring timers, keyed by call id. A timer
    /// only fires if its token still matches; answering or ending the call
    /// drops the token and turns the timer into a no-op.
    ring_tokens: HashMap<String, u64>,
    next_ring_token: u64,
}

/// Side effects a mutation produces under the lock and the dispatcher
/// performs after releasing it: event publications, ledger write-through
/// commands and ring timers to arm.
#[derive(Default)]
struct Effects {
    events: Vec<DispatchEvent>,
    writes: Vec<LedgerCommand>,
    ring_arms: Vec<(String, u64)>,
}

impl Effects {
    fn emit(&mut self, event: DispatchEvent) {
        self.events.push(event);
    }

    fn save_call(&mut self, call: &Call) {
        self.writes.push(LedgerCommand::SaveCall(call.clone()));
    }

    fn save_agent(&mut self, agent: &Agent) {
        self.writes.push(LedgerCommand::SaveAgent(agent.clone()));
    }

    fn replace_queue(&mut self, entries: Vec<QueueEntry>) {
        self.writes.push(LedgerCommand::ReplaceQueue(entries));
    }
}

/// The sole mutator of call-center state. Every operation takes the write
/// lock, applies one atomic mutation validated by the lifecycle table, and
/// only after releasing the lock publishes events, submits ledger writes and
/// arms ring timers. Reads take the same lock in shared mode, so callers
/// never observe a half-applied transition.
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<RwLock<DispatchState>>,
    directory: Arc<dyn Directory>,
    ledger: Arc<dyn Ledger>,
    writer: LedgerWriterHandle,
    broadcaster: Arc<dyn EventBroadcaster>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(
        directory: Arc<dyn Directory>,
        ledger: Arc<dyn Ledger>,
        broadcaster: Arc<dyn EventBroadcaster>,
        writer: LedgerWriterHandle,
        options: DispatchOptions,
    ) -> Self {
        let state = DispatchState {
            calls: HashMap::new(),
            registry: AgentRegistry::new(),
            queue: CallQueue::new(options.average_service_time_secs, options.max_queue_size),
            ring_tokens: HashMap::new(),
            next_ring_token: 0,
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            directory,
            ledger,
            writer,
            broadcaster,
            options,
        }
    }

    /// Intake for a new inbound call: assign to the best available agent,
    /// queue it, or reject it busy when the queue is at capacity.
    pub async fn initiate_call(
        &self,
        caller_number: &str,
        called_number: Option<&str>,
    ) -> DispatchResult<DispatchOutcome> {
        // 1. Validate input before touching any state.
        let caller_number = caller_number.trim();
        if caller_number.is_empty() {
            return Err(DispatchError::InvalidInput(
                "Missing caller number".to_string(),
            ));
        }
        let called_number = match called_number.map(str::trim) {
            Some(number) if !number.is_empty() => number.to_string(),
            _ => HOTLINE_NUMBER.to_string(),
        };

        // 2. Resolve the caller against the CRM directory outside the lock.
        //    Lookup failures degrade to an unknown caller.
        let customer = match self.directory.find_customer_by_phone(caller_number).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!("Customer lookup failed for {}: {}", caller_number, err);
                None
            }
        };

        let now = Utc::now();
        let mut effects = Effects::default();
        let outcome = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            let mut call = Call::new(
                caller_number.to_string(),
                called_number,
                customer.as_ref().map(|c| c.id.clone()),
                now,
            );

            // 3. Route: best available agent first, queue second, busy last.
            match state.registry.find_best_available() {
                Some(best) => {
                    validate_transition(call.status, CallStatus::Ringing)?;
                    call.status = CallStatus::Ringing;
                    call.agent_id = Some(best.id.clone());
                    let agent = state
                        .registry
                        .assign_call(&best.id, &call.id, now)
                        .ok_or_else(|| {
                            DispatchError::NotFound(format!("Agent {} not found", best.id))
                        })?;
                    let token = Self::issue_ring_token(state, &call.id);
                    effects.ring_arms.push((call.id.clone(), token));

                    effects.emit(DispatchEvent::IncomingCall {
                        call_id: call.id.clone(),
                        caller_number: call.caller_number.clone(),
                        called_number: call.called_number.clone(),
                        assigned_agent: Some(agent.clone()),
                        customer: customer.clone(),
                    });
                    effects.emit(DispatchEvent::AgentStatusUpdate {
                        agent_id: agent.id.clone(),
                        status: agent.status,
                    });
                    effects.save_call(&call);
                    effects.save_agent(&agent);
                    state.calls.insert(call.id.clone(), call.clone());

                    tracing::info!("Call {} ringing on agent {}", call.id, agent.id);
                    DispatchOutcome::Assigned { call, agent }
                }
                None if state.queue.is_full() => {
                    validate_transition(call.status, CallStatus::Busy)?;
                    call.status = CallStatus::Busy;

                    effects.emit(DispatchEvent::IncomingCall {
                        call_id: call.id.clone(),
                        caller_number: call.caller_number.clone(),
                        called_number: call.called_number.clone(),
                        assigned_agent: None,
                        customer: customer.clone(),
                    });
                    effects.save_call(&call);
                    state.calls.insert(call.id.clone(), call.clone());

                    tracing::warn!("Call {} rejected busy, queue at capacity", call.id);
                    DispatchOutcome::Rejected { call }
                }
                None => {
                    let entry = state.queue.enqueue(
                        call.id.clone(),
                        call.caller_number.clone(),
                        DEFAULT_QUEUE_PRIORITY,
                        now,
                    );

                    effects.emit(DispatchEvent::IncomingCall {
                        call_id: call.id.clone(),
                        caller_number: call.caller_number.clone(),
                        called_number: call.called_number.clone(),
                        assigned_agent: None,
                        customer: customer.clone(),
                    });
                    effects.emit(DispatchEvent::CallQueued {
                        call_id: call.id.clone(),
                        position: entry.position,
                        estimated_wait_time: entry.estimated_wait_secs,
                    });
                    effects.save_call(&call);
                    effects.replace_queue(state.queue.snapshot());
                    state.calls.insert(call.id.clone(), call.clone());

                    tracing::info!(
                        "Call {} queued at position {} (est. wait {}s)",
                        call.id,
                        entry.position,
                        entry.estimated_wait_secs
                    );
                    DispatchOutcome::Queued { call, entry }
                }
            }
        };

        self.apply(effects);
        Ok(outcome)
    }

    /// An agent picks up a ringing call. The pickup timestamps the call,
    /// fixes its queue-time, and invalidates the pending ring timer.
    pub async fn answer_call(&self, call_id: &str, agent_id: &str) -> DispatchResult<Call> {
        let now = Utc::now();
        let mut effects = Effects::default();
        let (call, agent) = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            // 1. Both sides must exist and the call must be ringing.
            let mut call = state.calls.get(call_id).cloned().ok_or_else(|| {
                DispatchError::NotFound(format!("Call {} not found", call_id))
            })?;
            if state.registry.get(agent_id).is_none() {
                return Err(DispatchError::NotFound(format!(
                    "Agent {} not found",
                    agent_id
                )));
            }
            validate_transition(call.status, CallStatus::Connected)?;

            // 2. If a different agent was ringing, hand them back first.
            if let Some(previous) = call.agent_id.clone() {
                if previous != agent_id {
                    if let Some(released) = state.registry.release(&previous, now) {
                        effects.emit(DispatchEvent::AgentStatusUpdate {
                            agent_id: released.id.clone(),
                            status: released.status,
                        });
                        effects.save_agent(&released);
                    }
                }
            }

            // 3. Connect and fix the timings.
            call.status = CallStatus::Connected;
            call.agent_id = Some(agent_id.to_string());
            call.answer_time = Some(now);
            call.queue_time_secs = (now - call.start_time).num_seconds();
            state.ring_tokens.remove(call_id);

            let agent = state
                .registry
                .assign_call(agent_id, call_id, now)
                .ok_or_else(|| {
                    DispatchError::NotFound(format!("Agent {} not found", agent_id))
                })?;

            // 4. A call answered directly may still hold a queue slot.
            if state.queue.remove(call_id).is_some() {
                effects.replace_queue(state.queue.snapshot());
            }

            state.calls.insert(call.id.clone(), call.clone());
            effects.save_call(&call);
            effects.save_agent(&agent);

            // 5. Handing an agent back may have opened capacity for the queue.
            self.drain_queue(state, &mut effects, now);

            (call, agent)
        };

        // 6. Resolve the agent's display identity outside the lock and
        //    announce the pickup.
        let agent_user = self.resolve_user(&agent.user_id).await;
        effects.emit(DispatchEvent::CallAnswered {
            call_id: call.id.clone(),
            agent: agent.clone(),
            agent_user: agent_user.clone(),
        });
        effects.emit(DispatchEvent::CallConnected {
            call_id: call.id.clone(),
            agent,
            agent_user,
        });
        self.apply(effects);

        tracing::info!("Call {} answered by agent {}", call.id, agent_id);
        Ok(call)
    }

    /// Hang up. Fixes end-of-call timings, credits the handling agent's
    /// stats, frees them, and immediately re-dispatches the queue onto the
    /// freed capacity.
    pub async fn end_call(&self, call_id: &str, ended_by: EndedBy) -> DispatchResult<Call> {
        let now = Utc::now();
        let mut effects = Effects::default();
        let call = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            // 1. Validate the hang-up against the lifecycle table.
            let mut call = state.calls.get(call_id).cloned().ok_or_else(|| {
                DispatchError::NotFound(format!("Call {} not found", call_id))
            })?;
            validate_transition(call.status, CallStatus::Ended)?;

            // 2. Fix timings: talk time only accrues to answered calls.
            call.status = CallStatus::Ended;
            call.end_time = Some(now);
            call.talk_duration_secs = call
                .answer_time
                .map(|answered| (now - answered).num_seconds())
                .unwrap_or(0);
            state.ring_tokens.remove(call_id);

            effects.emit(DispatchEvent::CallEnded {
                call_id: call.id.clone(),
                ended_by,
            });

            // 3. A queued call can be ended by the caller before assignment.
            if state.queue.remove(call_id).is_some() {
                effects.replace_queue(state.queue.snapshot());
            }

            // 4. Free the handling agent and credit their stats.
            if let Some(agent_id) = call.agent_id.clone() {
                if let Some(released) = state.registry.release(&agent_id, now) {
                    let credited = state
                        .registry
                        .record_call_completed(&agent_id, call.talk_duration_secs)
                        .unwrap_or(released);
                    effects.emit(DispatchEvent::AgentStatusUpdate {
                        agent_id: credited.id.clone(),
                        status: credited.status,
                    });
                    effects.save_agent(&credited);
                }
            }

            state.calls.insert(call.id.clone(), call.clone());
            effects.save_call(&call);

            // 5. The freed agent can take the queue head right away.
            self.drain_queue(state, &mut effects, now);

            call
        };

        self.apply(effects);
        tracing::info!(
            "Call {} ended by {} after {}s of talk",
            call.id,
            ended_by,
            call.talk_duration_secs
        );
        Ok(call)
    }

    /// Park a connected call.
    pub async fn hold_call(&self, call_id: &str) -> DispatchResult<Call> {
        let call = self.set_call_status(call_id, CallStatus::OnHold).await?;
        tracing::info!("Call {} placed on hold", call.id);
        Ok(call)
    }

    /// Resume a held call.
    pub async fn resume_call(&self, call_id: &str) -> DispatchResult<Call> {
        let call = self.set_call_status(call_id, CallStatus::Connected).await?;
        tracing::info!("Call {} resumed", call.id);
        Ok(call)
    }

    /// Hand a live call to another agent. The call passes through the
    /// transfer state and reconnects on the target; the previous agent is
    /// freed without stat credit, which stays reserved for the final hang-up.
    pub async fn transfer_call(
        &self,
        call_id: &str,
        to_agent_id: &str,
    ) -> DispatchResult<Call> {
        let now = Utc::now();
        let mut effects = Effects::default();
        let (call, target) = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            // 1. The call must be live and transferable.
            let mut call = state.calls.get(call_id).cloned().ok_or_else(|| {
                DispatchError::NotFound(format!("Call {} not found", call_id))
            })?;
            validate_transition(call.status, CallStatus::Transferred)?;

            // 2. The target must exist, be free, and differ from the handler.
            let target = state.registry.get(to_agent_id).cloned().ok_or_else(|| {
                DispatchError::NotFound(format!("Agent {} not found", to_agent_id))
            })?;
            if call.agent_id.as_deref() == Some(to_agent_id) {
                return Err(DispatchError::InvalidState(format!(
                    "Agent {} is already handling call {}",
                    to_agent_id, call_id
                )));
            }
            if target.status != AgentPresence::Available {
                return Err(DispatchError::InvalidState(format!(
                    "Agent {} is {}, not available for transfer",
                    target.id, target.status
                )));
            }

            // 3. Walk the call through TRANSFERRED back to CONNECTED.
            validate_transition(CallStatus::Transferred, CallStatus::Connected)?;
            call.status = CallStatus::Connected;

            if let Some(previous) = call.agent_id.clone() {
                if let Some(released) = state.registry.release(&previous, now) {
                    effects.emit(DispatchEvent::AgentStatusUpdate {
                        agent_id: released.id.clone(),
                        status: released.status,
                    });
                    effects.save_agent(&released);
                }
            }
            call.agent_id = Some(to_agent_id.to_string());
            let target = state
                .registry
                .assign_call(to_agent_id, call_id, now)
                .ok_or_else(|| {
                    DispatchError::NotFound(format!("Agent {} not found", to_agent_id))
                })?;
            effects.emit(DispatchEvent::AgentStatusUpdate {
                agent_id: target.id.clone(),
                status: target.status,
            });

            state.calls.insert(call.id.clone(), call.clone());
            effects.save_call(&call);
            effects.save_agent(&target);

            // 4. The freed agent can take the queue head.
            self.drain_queue(state, &mut effects, now);

            (call, target)
        };

        let agent_user = self.resolve_user(&target.user_id).await;
        effects.emit(DispatchEvent::CallConnected {
            call_id: call.id.clone(),
            agent: target.clone(),
            agent_user,
        });
        self.apply(effects);

        tracing::info!("Call {} transferred to agent {}", call.id, target.id);
        Ok(call)
    }

    /// The caller gives up while waiting in the queue. The call goes missed
    /// with no end timestamp, since it never reached an agent.
    pub async fn abandon_call(&self, call_id: &str) -> DispatchResult<Call> {
        let mut effects = Effects::default();
        let call = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            let mut call = state.calls.get(call_id).cloned().ok_or_else(|| {
                DispatchError::NotFound(format!("Call {} not found", call_id))
            })?;
            if call.status != CallStatus::Incoming {
                return Err(DispatchError::InvalidState(format!(
                    "Call {} is {}, only queued calls can be abandoned",
                    call_id, call.status
                )));
            }
            validate_transition(call.status, CallStatus::Missed)?;
            call.status = CallStatus::Missed;

            if state.queue.remove(call_id).is_some() {
                effects.replace_queue(state.queue.snapshot());
            }

            state.calls.insert(call.id.clone(), call.clone());
            effects.save_call(&call);
            effects.emit(DispatchEvent::CallEnded {
                call_id: call.id.clone(),
                ended_by: EndedBy::Caller,
            });

            call
        };

        self.apply(effects);
        tracing::info!("Call {} abandoned while queued", call.id);
        Ok(call)
    }

    /// Append wrap-up text to a call's notes. Works on any call, including
    /// terminal ones; notes are usually written after the hang-up.
    pub async fn append_note(&self, call_id: &str, text: &str) -> DispatchResult<Call> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DispatchError::InvalidInput(
                "Missing note text".to_string(),
            ));
        }

        let mut effects = Effects::default();
        let call = {
            let mut guard = self.state.write().await;

            let mut call = guard.calls.get(call_id).cloned().ok_or_else(|| {
                DispatchError::NotFound(format!("Call {} not found", call_id))
            })?;
            call.notes = Some(match call.notes.take() {
                Some(existing) => format!("{}\n{}", existing, text),
                None => text.to_string(),
            });

            guard.calls.insert(call.id.clone(), call.clone());
            effects.save_call(&call);
            call
        };

        self.apply(effects);
        tracing::info!("Note appended to call {}", call.id);
        Ok(call)
    }

    /// Manual presence report from an agent or supervisor. ON_CALL is owned
    /// by call assignment and cannot be set by hand. Going AVAILABLE
    /// immediately offers the agent to the queue.
    pub async fn set_agent_presence(
        &self,
        agent_id: &str,
        status: AgentPresence,
    ) -> DispatchResult<Agent> {
        if status == AgentPresence::OnCall {
            return Err(DispatchError::InvalidInput(
                "Agent status on_call is set by call assignment, not manually".to_string(),
            ));
        }

        let now = Utc::now();
        let mut effects = Effects::default();
        let agent = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            let agent = state.registry.set_status(agent_id, status, now);
            effects.emit(DispatchEvent::AgentStatusUpdate {
                agent_id: agent.id.clone(),
                status: agent.status,
            });
            effects.save_agent(&agent);

            if status == AgentPresence::Available {
                self.drain_queue(state, &mut effects, now);
            }

            // The drain may have put the agent straight onto a queued call.
            state.registry.get(agent_id).cloned().unwrap_or(agent)
        };

        self.apply(effects);
        tracing::info!("Agent {} presence set to {}", agent_id, agent.status);
        Ok(agent)
    }

    /// Explicit onboarding with routing priority and shift window. Re-runs
    /// are upserts: accumulated stats and live presence survive.
    pub async fn register_agent(&self, profile: AgentProfile) -> DispatchResult<Agent> {
        if profile.agent_id.trim().is_empty() || profile.user_id.trim().is_empty() {
            return Err(DispatchError::InvalidInput(
                "Agent id and user id are required".to_string(),
            ));
        }

        let now = Utc::now();
        let mut effects = Effects::default();
        let agent = {
            let mut guard = self.state.write().await;
            let agent = guard.registry.register(&profile, now);
            effects.save_agent(&agent);
            agent
        };

        self.apply(effects);
        tracing::info!(
            "Agent {} registered with priority {}",
            agent.id,
            agent.priority
        );
        Ok(agent)
    }

    /// Offer every available agent to the queue, head first. Assignments
    /// follow the same ringing path as direct intake. Returns how many calls
    /// were assigned; a second invocation right after is always 0.
    pub async fn redispatch(&self) -> usize {
        let now = Utc::now();
        let mut effects = Effects::default();
        let assigned = {
            let mut guard = self.state.write().await;
            self.drain_queue(&mut guard, &mut effects, now)
        };
        self.apply(effects);
        assigned
    }

    // --- read surface -----------------------------------------------------

    pub async fn get_call(&self, call_id: &str) -> Option<Call> {
        self.state.read().await.calls.get(call_id).cloned()
    }

    /// Calls not yet in a terminal state, oldest first.
    pub async fn active_calls(&self) -> Vec<Call> {
        let state = self.state.read().await;
        let mut calls: Vec<Call> = state
            .calls
            .values()
            .filter(|call| call.status.is_active())
            .cloned()
            .collect();
        calls.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        calls
    }

    pub async fn queue_snapshot(&self) -> Vec<QueueEntry> {
        self.state.read().await.queue.snapshot()
    }

    pub async fn agents(&self) -> Vec<Agent> {
        self.state.read().await.registry.all()
    }

    pub async fn get_agent(&self, agent_id: &str) -> Option<Agent> {
        self.state.read().await.registry.get(agent_id).cloned()
    }

    pub async fn get_agent_by_user(&self, user_id: &str) -> Option<Agent> {
        self.state
            .read()
            .await
            .registry
            .get_by_user_id(user_id)
            .cloned()
    }

    /// One page of the persisted call history, newest first.
    pub async fn call_history(
        &self,
        page: i64,
        per_page: i64,
    ) -> DispatchResult<CallHistoryPage> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let (calls, total_count) = self.ledger.call_history(page, per_page).await?;
        let total_pages = if total_count == 0 {
            0
        } else {
            (total_count + per_page - 1) / per_page
        };
        Ok(CallHistoryPage {
            calls,
            pagination: PaginationMetadata {
                page,
                per_page,
                total_count,
                total_pages,
            },
        })
    }

    /// Consistent wallboard snapshot taken under a single read guard.
    pub async fn dashboard(&self) -> DashboardSnapshot {
        let state = self.state.read().await;
        let mut active_calls: Vec<Call> = state
            .calls
            .values()
            .filter(|call| call.status.is_active())
            .cloned()
            .collect();
        active_calls.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        DashboardSnapshot {
            active_calls,
            queue: state.queue.snapshot(),
            agents: state.registry.all(),
        }
    }

    /// Take a wallboard snapshot and broadcast it on the dispatch topic.
    pub async fn publish_dashboard(&self) -> DashboardSnapshot {
        let snapshot = self.dashboard().await;
        self.broadcaster
            .publish(DispatchEvent::DashboardSnapshot(snapshot.clone()));
        snapshot
    }

    /// Follow the full event feed.
    pub fn subscribe(&self) -> EventStream {
        self.broadcaster.subscribe()
    }

    /// Follow one topic of the event feed.
    pub fn subscribe_topic(&self, topic: Topic) -> EventStream {
        self.broadcaster.subscribe_topic(topic)
    }

    // --- internals ---------------------------------------------------------

    /// Assign queued calls to available agents until either runs out. Each
    /// assignment rings like direct intake, including the ring timer.
    /// Returns the number of calls assigned.
    fn drain_queue(
        &self,
        state: &mut DispatchState,
        effects: &mut Effects,
        now: DateTime<Utc>,
    ) -> usize {
        let mut assigned = 0;
        let mut dequeued = false;

        loop {
            if state.queue.is_empty() {
                break;
            }
            let best = match state.registry.find_best_available() {
                Some(agent) => agent,
                None => break,
            };
            let entry = match state.queue.dequeue_head() {
                Some(entry) => entry,
                None => break,
            };
            dequeued = true;

            let mut call = match state.calls.get(&entry.call_id).cloned() {
                Some(call) => call,
                None => {
                    tracing::warn!(
                        "Queued call {} has no record, dropping its entry",
                        entry.call_id
                    );
                    continue;
                }
            };
            if validate_transition(call.status, CallStatus::Ringing).is_err() {
                tracing::warn!(
                    "Queued call {} is {} and cannot ring, dropping its entry",
                    call.id,
                    call.status
                );
                continue;
            }

            call.status = CallStatus::Ringing;
            call.agent_id = Some(best.id.clone());
            let agent = match state.registry.assign_call(&best.id, &call.id, now) {
                Some(agent) => agent,
                None => continue,
            };
            let token = Self::issue_ring_token(state, &call.id);
            effects.ring_arms.push((call.id.clone(), token));

            effects.emit(DispatchEvent::IncomingCall {
                call_id: call.id.clone(),
                caller_number: call.caller_number.clone(),
                called_number: call.called_number.clone(),
                assigned_agent: Some(agent.clone()),
                customer: None,
            });
            effects.emit(DispatchEvent::AgentStatusUpdate {
                agent_id: agent.id.clone(),
                status: agent.status,
            });
            state.calls.insert(call.id.clone(), call.clone());
            effects.save_call(&call);
            effects.save_agent(&agent);

            tracing::info!("Queued call {} now ringing on agent {}", call.id, agent.id);
            assigned += 1;
        }

        if dequeued {
            effects.replace_queue(state.queue.snapshot());
        }
        assigned
    }

    fn issue_ring_token(state: &mut DispatchState, call_id: &str) -> u64 {
        let token = state.next_ring_token;
        state.next_ring_token += 1;
        state.ring_tokens.insert(call_id.to_string(), token);
        token
    }

    /// Unanswered-ring deadline. Re-enters the lock when the timer fires and
    /// backs off silently if the token went stale, i.e. the call was answered,
    /// ended or reassigned in the meantime.
    async fn expire_ring(&self, call_id: &str, token: u64) {
        let now = Utc::now();
        let mut effects = Effects::default();
        {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            if state.ring_tokens.get(call_id) != Some(&token) {
                tracing::debug!("Stale ring timer for call {} ignored", call_id);
                return;
            }
            state.ring_tokens.remove(call_id);

            let mut call = match state.calls.get(call_id).cloned() {
                Some(call) => call,
                None => return,
            };
            if validate_transition(call.status, CallStatus::Missed).is_err() {
                return;
            }
            call.status = CallStatus::Missed;

            effects.emit(DispatchEvent::CallEnded {
                call_id: call.id.clone(),
                ended_by: EndedBy::System,
            });

            if let Some(agent_id) = call.agent_id.clone() {
                if let Some(released) = state.registry.release(&agent_id, now) {
                    effects.emit(DispatchEvent::AgentStatusUpdate {
                        agent_id: released.id.clone(),
                        status: released.status,
                    });
                    effects.save_agent(&released);
                }
            }

            state.calls.insert(call.id.clone(), call.clone());
            effects.save_call(&call);

            tracing::warn!("Call {} missed: ring timed out", call.id);

            self.drain_queue(state, &mut effects, now);
        }
        self.apply(effects);
    }

    fn arm_ring_timer(&self, call_id: String, token: u64) {
        let timeout = self.options.ring_timeout;
        if timeout.is_zero() {
            return;
        }
        let dispatcher = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            dispatcher.expire_ring(&call_id, token).await;
        });
    }

    /// Shared hold/resume body: one validated status flip plus write-through.
    async fn set_call_status(&self, call_id: &str, to: CallStatus) -> DispatchResult<Call> {
        let mut effects = Effects::default();
        let call = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            let mut call = state.calls.get(call_id).cloned().ok_or_else(|| {
                DispatchError::NotFound(format!("Call {} not found", call_id))
            })?;
            validate_transition(call.status, to)?;
            call.status = to;
            state.calls.insert(call.id.clone(), call.clone());
            effects.save_call(&call);
            call
        };
        self.apply(effects);
        Ok(call)
    }

    async fn resolve_user(&self, user_id: &str) -> Option<UserSummary> {
        match self.directory.find_user_by_id(user_id).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!("User lookup failed for {}: {}", user_id, err);
                None
            }
        }
    }

    /// Perform a mutation's side effects after the lock is gone: publish,
    /// write through, arm timers.
    fn apply(&self, effects: Effects) {
        for event in effects.events {
            self.broadcaster.publish(event);
        }
        for write in effects.writes {
            self.writer.submit(write);
        }
        for (call_id, token) in effects.ring_arms {
            self.arm_ring_timer(call_id, token);
        }
    }
}
