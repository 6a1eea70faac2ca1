use crate::domain::entities::{Agent, AgentPresence, Call, EndedBy, QueueEntry};
use crate::domain::ports::{CustomerSummary, UserSummary};
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Routing key for event subscriptions. `Dispatch` carries the call-center
/// wide feed, `Presence` the agent status feed, and `Call` the per-call feed
/// a softphone or supervisor view follows for one call id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Dispatch,
    Presence,
    Call(String),
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topic::Dispatch => write!(f, "dispatch"),
            Topic::Presence => write!(f, "presence"),
            Topic::Call(call_id) => write!(f, "call:{}", call_id),
        }
    }
}

/// Read-model snapshot pushed to wallboards: everything a dashboard renders
/// in one payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub active_calls: Vec<Call>,
    pub queue: Vec<QueueEntry>,
    pub agents: Vec<Agent>,
}

/// Everything the dispatcher announces to the outside world. The serde shape
/// is the wire contract: `{"event": "<name>", "data": {...}}` with camelCase
/// payload keys, so an embedding transport can forward serialized events
/// verbatim.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum DispatchEvent {
    #[serde(rename_all = "camelCase")]
    AgentStatusUpdate { agent_id: String, status: AgentPresence },
    #[serde(rename_all = "camelCase")]
    IncomingCall {
        call_id: String,
        caller_number: String,
        called_number: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        assigned_agent: Option<Agent>,
        #[serde(skip_serializing_if = "Option::is_none")]
        customer: Option<CustomerSummary>,
    },
    #[serde(rename_all = "camelCase")]
    CallQueued {
        call_id: String,
        position: i64,
        estimated_wait_time: i64,
    },
    #[serde(rename_all = "camelCase")]
    CallAnswered {
        call_id: String,
        agent: Agent,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_user: Option<UserSummary>,
    },
    #[serde(rename_all = "camelCase")]
    CallConnected {
        call_id: String,
        agent: Agent,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_user: Option<UserSummary>,
    },
    #[serde(rename_all = "camelCase")]
    CallEnded { call_id: String, ended_by: EndedBy },
    DashboardSnapshot(DashboardSnapshot),
}

impl DispatchEvent {
    /// Wire name of the event, matching the serde `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            DispatchEvent::AgentStatusUpdate { .. } => "agent_status_update",
            DispatchEvent::IncomingCall { .. } => "incoming_call",
            DispatchEvent::CallQueued { .. } => "call_queued",
            DispatchEvent::CallAnswered { .. } => "call_answered",
            DispatchEvent::CallConnected { .. } => "call_connected",
            DispatchEvent::CallEnded { .. } => "call_ended",
            DispatchEvent::DashboardSnapshot(_) => "dashboard_snapshot",
        }
    }

    /// The single topic an event is delivered on.
    pub fn topic(&self) -> Topic {
        match self {
            DispatchEvent::AgentStatusUpdate { .. } => Topic::Presence,
            DispatchEvent::CallConnected { call_id, .. } => Topic::Call(call_id.clone()),
            _ => Topic::Dispatch,
        }
    }

    /// The `{"event", "data"}` envelope as a JSON value.
    pub fn envelope(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

pub type EventStream =
    Pin<Box<dyn Stream<Item = Result<DispatchEvent, BroadcastStreamRecvError>> + Send>>;

/// Fan-out seam between the dispatcher and whatever transport delivers events
/// (websocket gateway, SSE, test recorder). Publishing is fire-and-forget:
/// a slow or absent subscriber never blocks call handling.
pub trait EventBroadcaster: Send + Sync {
    fn publish(&self, event: DispatchEvent);
    fn subscribe(&self) -> EventStream;
    fn subscribe_topic(&self, topic: Topic) -> EventStream;
}

/// In-process broadcaster over a tokio broadcast channel. Every subscriber
/// gets every event from its subscription point on; lagged subscribers
/// receive a `BroadcastStreamRecvError::Lagged` marker instead of silently
/// losing their place.
pub struct LocalEventBroadcaster {
    sender: broadcast::Sender<DispatchEvent>,
}

impl LocalEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalEventBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl EventBroadcaster for LocalEventBroadcaster {
    fn publish(&self, event: DispatchEvent) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            tracing::debug!("No active subscribers for {} event", name);
        }
    }

    fn subscribe(&self) -> EventStream {
        Box::pin(BroadcastStream::new(self.sender.subscribe()))
    }

    fn subscribe_topic(&self, topic: Topic) -> EventStream {
        let stream = BroadcastStream::new(self.sender.subscribe()).filter(move |item| {
            match item {
                Ok(event) => event.topic() == topic,
                // Lag markers pass through so subscribers can tell they
                // missed events on their topic.
                Err(_) => true,
            }
        });
        Box::pin(stream)
    }
}

/// Broadcaster double that records every published event for inspection.
/// Subscriptions yield nothing; tests assert against `recorded()`.
#[derive(Default)]
pub struct RecordingBroadcaster {
    events: Mutex<Vec<DispatchEvent>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<DispatchEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn event_names(&self) -> Vec<&'static str> {
        self.recorded().iter().map(|event| event.name()).collect()
    }
}

impl EventBroadcaster for RecordingBroadcaster {
    fn publish(&self, event: DispatchEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn subscribe(&self) -> EventStream {
        Box::pin(tokio_stream::empty())
    }

    fn subscribe_topic(&self, _topic: Topic) -> EventStream {
        Box::pin(tokio_stream::empty())
    }
}
