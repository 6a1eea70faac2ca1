use crate::domain::entities::{Agent, AgentPresence, AgentProfile};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// In-memory presence table for call-center agents.
///
/// Owned by the dispatcher and only ever touched under its lock; nothing else
/// holds a reference to the map. ON_CALL is set exclusively through
/// `assign_call` so the "current call id set iff on call" invariant cannot be
/// broken by a plain presence update.
pub struct AgentRegistry {
    agents: HashMap<String, Agent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn get(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.get(agent_id)
    }

    pub fn get_by_user_id(&self, user_id: &str) -> Option<&Agent> {
        self.agents.values().find(|a| a.user_id == user_id)
    }

    /// All agents, sorted by id so snapshots are deterministic.
    pub fn all(&self) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    /// Onboarding upsert. Presence, assignment and accumulated stats survive
    /// re-registration; identity, priority and shift window are overwritten.
    pub fn register(&mut self, profile: &AgentProfile, now: DateTime<Utc>) -> Agent {
        let agent = self
            .agents
            .entry(profile.agent_id.clone())
            .or_insert_with(|| {
                Agent::new(profile.agent_id.clone(), profile.user_id.clone(), now)
            });
        agent.user_id = profile.user_id.clone();
        agent.priority = profile.priority;
        agent.shift_start = profile.shift_start;
        agent.shift_end = profile.shift_end;
        agent.clone()
    }

    /// Presence update, auto-provisioning a row on first report (the row's
    /// user id defaults to the agent id until onboarding fills it in).
    /// Any non-ON_CALL presence clears a dangling assignment.
    pub fn set_status(&mut self, agent_id: &str, status: AgentPresence, now: DateTime<Utc>) -> Agent {
        let agent = self
            .agents
            .entry(agent_id.to_string())
            .or_insert_with(|| Agent::new(agent_id.to_string(), agent_id.to_string(), now));
        agent.status = status;
        if status != AgentPresence::OnCall {
            agent.current_call_id = None;
        }
        agent.last_activity = now;
        agent.clone()
    }

    /// Dispatcher assignment path: agent goes ON_CALL holding the given call.
    pub fn assign_call(&mut self, agent_id: &str, call_id: &str, now: DateTime<Utc>) -> Option<Agent> {
        let agent = self.agents.get_mut(agent_id)?;
        agent.status = AgentPresence::OnCall;
        agent.current_call_id = Some(call_id.to_string());
        agent.last_activity = now;
        Some(agent.clone())
    }

    /// Dispatcher release path: agent returns to AVAILABLE with no call.
    pub fn release(&mut self, agent_id: &str, now: DateTime<Utc>) -> Option<Agent> {
        let agent = self.agents.get_mut(agent_id)?;
        agent.status = AgentPresence::Available;
        agent.current_call_id = None;
        agent.last_activity = now;
        Some(agent.clone())
    }

    /// Completion accounting: one call, `talk_secs` of talk time. The average
    /// is plain float division and stays 0 until the first completion.
    pub fn record_call_completed(&mut self, agent_id: &str, talk_secs: i64) -> Option<Agent> {
        let agent = self.agents.get_mut(agent_id)?;
        agent.total_calls += 1;
        agent.total_talk_secs += talk_secs;
        agent.avg_handle_secs = if agent.total_calls > 0 {
            agent.total_talk_secs as f64 / agent.total_calls as f64
        } else {
            0.0
        };
        Some(agent.clone())
    }

    /// The AVAILABLE agent with the highest priority weight; ties go to the
    /// longest-idle agent (earliest last_activity), then to the smaller id.
    /// Total order, so assignment is reproducible.
    pub fn find_best_available(&self) -> Option<Agent> {
        self.agents
            .values()
            .filter(|a| a.status == AgentPresence::Available)
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.last_activity.cmp(&b.last_activity))
                    .then(a.id.cmp(&b.id))
            })
            .cloned()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
