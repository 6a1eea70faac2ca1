use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle states of a call. Serialized literals are the wire contract
/// consumed by agent UIs and the CRM feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Incoming,
    Ringing,
    Connected,
    OnHold,
    Transferred,
    Ended,
    Missed,
    Busy,
}

impl CallStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Ended | CallStatus::Missed | CallStatus::Busy
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallStatus::Incoming => write!(f, "incoming"),
            CallStatus::Ringing => write!(f, "ringing"),
            CallStatus::Connected => write!(f, "connected"),
            CallStatus::OnHold => write!(f, "on_hold"),
            CallStatus::Transferred => write!(f, "transferred"),
            CallStatus::Ended => write!(f, "ended"),
            CallStatus::Missed => write!(f, "missed"),
            CallStatus::Busy => write!(f, "busy"),
        }
    }
}

impl std::str::FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "incoming" => Ok(CallStatus::Incoming),
            "ringing" => Ok(CallStatus::Ringing),
            "connected" => Ok(CallStatus::Connected),
            "on_hold" => Ok(CallStatus::OnHold),
            "transferred" => Ok(CallStatus::Transferred),
            "ended" => Ok(CallStatus::Ended),
            "missed" => Ok(CallStatus::Missed),
            "busy" => Ok(CallStatus::Busy),
            _ => Err(format!("Invalid call status: {}", s)),
        }
    }
}

/// Who hung up. Carried on the call_ended event, not on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndedBy {
    Agent,
    Caller,
    System,
}

impl std::fmt::Display for EndedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndedBy::Agent => write!(f, "agent"),
            EndedBy::Caller => write!(f, "caller"),
            EndedBy::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for EndedBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "agent" => Ok(EndedBy::Agent),
            "caller" => Ok(EndedBy::Caller),
            "system" => Ok(EndedBy::System),
            _ => Err(format!("Invalid ended_by: {}", s)),
        }
    }
}

/// A single inbound call, from first signal to hang-up. Mutated only by the
/// dispatcher; retained in memory for the process lifetime and written through
/// to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    #[serde(rename = "callId")]
    pub id: String,
    pub caller_number: String,
    pub called_number: String,
    pub customer_id: Option<String>,
    pub agent_id: Option<String>,
    pub status: CallStatus,
    pub start_time: DateTime<Utc>,
    pub answer_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(rename = "queueTime")]
    pub queue_time_secs: i64,
    #[serde(rename = "talkDuration")]
    pub talk_duration_secs: i64,
    pub notes: Option<String>,
    pub recording_url: Option<String>,
}

impl Call {
    pub fn new(
        caller_number: String,
        called_number: String,
        customer_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_call_id(),
            caller_number,
            called_number,
            customer_id,
            agent_id: None,
            status: CallStatus::Incoming,
            start_time: now,
            answer_time: None,
            end_time: None,
            queue_time_secs: 0,
            talk_duration_secs: 0,
            notes: None,
            recording_url: None,
        }
    }
}

/// Call ids are short opaque tokens: "CALL_" plus 8 uppercase hex characters.
fn generate_call_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("CALL_{}", hex[..8].to_uppercase())
}
