use chrono::{DateTime, Utc};

use crate::errors::StreamFailure;
use crate::model::{AgentId, TurnId};

/// Classification of a stream event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Task snapshot.
    Task,
    /// Task lifecycle transition.
    Status,
    /// Content-bearing artifact chunk.
    Artifact,
    /// Role-tagged chat message.
    Message,
    /// Sub-agent tool call started.
    ToolStart,
    /// Sub-agent tool call finished.
    ToolEnd,
    /// Remote-reported JSON-RPC error.
    Error,
}

/// One classified frame. Immutable once built.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct StreamEvent {
    /// Client-side unique id.
    pub id: uuid::Uuid,
    /// Non-decreasing within one stream.
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub task_id: Option<String>,
    /// Turn the event belongs to.
    pub context_id: TurnId,
    /// `None` means supervisor / unattributed.
    pub source_agent: Option<AgentId>,
    pub artifact_name: Option<String>,
    pub display_content: String,
    /// `true` folds onto accumulated text, `false` replaces it.
    pub should_append: bool,
    pub is_final: bool,
    pub is_last_chunk: bool,
    /// Decoded payload, kept for diagnostics only.
    pub raw: serde_json::Value,
}

impl StreamEvent {
    /// No further content arrives for this (turn, agent) after a terminal event.
    pub fn is_terminal(&self) -> bool {
        self.is_final || self.is_last_chunk
    }

    /// Whether `display_content` belongs in the accumulated response text.
    ///
    /// Task/status snapshots and tool notifications only carry state; user
    /// message echoes are not part of the response.
    pub fn carries_content(&self) -> bool {
        match self.kind {
            EventKind::Artifact | EventKind::Error => true,
            EventKind::Message => self.should_append,
            EventKind::Task | EventKind::Status | EventKind::ToolStart | EventKind::ToolEnd => {
                false
            }
        }
    }

    /// Attribution bucket, defaulting to the supervisor.
    pub fn agent(&self) -> AgentId {
        self.source_agent.clone().unwrap_or_else(AgentId::supervisor)
    }
}

/// Terminal result of an event stream.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StreamOutcome {
    /// The remote side closed the stream.
    ///
    /// `incomplete` is set when no terminal content event was seen first.
    Completed { incomplete: bool },
    /// Caller abort, or superseded by a newer send.
    Cancelled,
    /// Transport failure or liveness timeout.
    Failed(StreamFailure),
}

impl StreamOutcome {
    /// Cancellation and normal completion are not errors for the user.
    pub fn shows_error_banner(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Callback-style consumer for `EventStream::drive`.
pub trait StreamObserver {
    /// Called for every event with the updated text of its (turn, agent).
    fn on_event(&mut self, event: &StreamEvent, accumulated: &str) {
        let _ = (event, accumulated);
    }

    fn on_complete(&mut self, incomplete: bool) {
        let _ = incomplete;
    }

    fn on_cancelled(&mut self) {}

    fn on_error(&mut self, failure: &StreamFailure) {
        let _ = failure;
    }
}
