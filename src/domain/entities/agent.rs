use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live presence of a call-center agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPresence {
    Available,
    Busy,
    OnCall,
    Away,
    Offline,
}

impl Default for AgentPresence {
    fn default() -> Self {
        AgentPresence::Offline
    }
}

impl std::fmt::Display for AgentPresence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentPresence::Available => write!(f, "available"),
            AgentPresence::Busy => write!(f, "busy"),
            AgentPresence::OnCall => write!(f, "on_call"),
            AgentPresence::Away => write!(f, "away"),
            AgentPresence::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for AgentPresence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(AgentPresence::Available),
            "busy" => Ok(AgentPresence::Busy),
            "on_call" => Ok(AgentPresence::OnCall),
            "away" => Ok(AgentPresence::Away),
            "offline" => Ok(AgentPresence::Offline),
            _ => Err(format!("Invalid agent presence: {}", s)),
        }
    }
}

/// A registry row for one agent. Bound 1:1 to a CRM user; auto-provisioned
/// rows reuse the agent id as the user id until onboarding fills it in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub user_id: String,
    pub status: AgentPresence,
    pub current_call_id: Option<String>,
    pub total_calls: i64,
    #[serde(rename = "totalTalkTime")]
    pub total_talk_secs: i64,
    #[serde(rename = "avgHandleTime")]
    pub avg_handle_secs: f64,
    pub priority: i32,
    pub last_activity: DateTime<Utc>,
    pub shift_start: Option<DateTime<Utc>>,
    pub shift_end: Option<DateTime<Utc>>,
}

impl Agent {
    pub fn new(id: String, user_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            status: AgentPresence::default(),
            current_call_id: None,
            total_calls: 0,
            total_talk_secs: 0,
            avg_handle_secs: 0.0,
            priority: 1,
            last_activity: now,
            shift_start: None,
            shift_end: None,
        }
    }
}

/// Onboarding descriptor for explicit agent registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub agent_id: String,
    pub user_id: String,
    pub priority: i32,
    pub shift_start: Option<DateTime<Utc>>,
    pub shift_end: Option<DateTime<Utc>>,
}
