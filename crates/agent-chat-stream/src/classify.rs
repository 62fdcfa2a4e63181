//! Frame classification into `StreamEvent`s.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::attribution::{AttributionHints, Attributor};
use crate::model::{AgentId, TurnId};
use crate::protocol::{
    JsonRpcError, JsonRpcResponse, Message, Role, StreamResult, TOOL_END_ARTIFACT,
    TOOL_START_ARTIFACT, Task, TaskArtifactUpdateEvent, TaskStatusUpdateEvent,
};
use crate::stream::{EventKind, StreamEvent};
use crate::transport::SseFrame;

/// Per-stream classifier.
///
/// Holds the state that must survive across frames: the timestamp floor and
/// the agent each artifact id was first attributed to.
pub struct Classifier {
    turn: TurnId,
    attributor: Arc<dyn Attributor>,
    last_timestamp: Option<DateTime<Utc>>,
    artifact_agents: HashMap<String, AgentId>,
}

struct Draft {
    kind: EventKind,
    task_id: Option<String>,
    context_id: Option<String>,
    source_agent: Option<AgentId>,
    artifact_name: Option<String>,
    display_content: String,
    should_append: bool,
    is_final: bool,
    is_last_chunk: bool,
}

impl Draft {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            task_id: None,
            context_id: None,
            source_agent: None,
            artifact_name: None,
            display_content: String::new(),
            should_append: false,
            is_final: false,
            is_last_chunk: false,
        }
    }
}

impl Classifier {
    /// `turn` is used for events whose payload carries no `contextId`.
    pub fn new(turn: TurnId, attributor: Arc<dyn Attributor>) -> Self {
        Self {
            turn,
            attributor,
            last_timestamp: None,
            artifact_agents: HashMap::new(),
        }
    }

    /// Classifies one frame. Malformed or non-actionable frames yield `None`.
    pub fn classify(&mut self, frame: &SseFrame) -> Option<StreamEvent> {
        let data = frame.data.trim();
        if data.is_empty() {
            return None;
        }
        match serde_json::from_str::<serde_json::Value>(data) {
            Ok(raw) => self.classify_value(raw),
            Err(e) => {
                warn!(turn_id = %self.turn, event = frame.event_type(), error = %e, "skipping malformed frame");
                None
            }
        }
    }

    /// Classifies an already-decoded JSON-RPC payload.
    pub fn classify_value(&mut self, raw: serde_json::Value) -> Option<StreamEvent> {
        let envelope = match serde_json::from_value::<JsonRpcResponse>(raw.clone()) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(turn_id = %self.turn, error = %e, "skipping frame without a JSON-RPC envelope");
                return None;
            }
        };

        if let Some(result) = envelope.result {
            match serde_json::from_value::<StreamResult>(result) {
                Ok(result) => {
                    let draft = self.draft_for(result);
                    return Some(self.build(draft, raw));
                }
                Err(e) => debug!(turn_id = %self.turn, error = %e, "unrecognized result kind"),
            }
        }
        if let Some(error) = envelope.error {
            let draft = remote_error_draft(&error, &self.turn);
            return Some(self.build(draft, raw));
        }
        None
    }

    fn draft_for(&mut self, result: StreamResult) -> Draft {
        match result {
            StreamResult::Task(task) => self.task_draft(&task),
            StreamResult::StatusUpdate(update) => self.status_draft(&update),
            StreamResult::ArtifactUpdate(update) => self.artifact_draft(&update),
            StreamResult::Message(message) => self.message_draft(&message),
        }
    }

    fn task_draft(&self, task: &Task) -> Draft {
        let mut draft = Draft::new(EventKind::Task);
        draft.task_id = Some(task.id.clone()).filter(|id| !id.is_empty());
        draft.context_id = task.context_id.clone();
        draft.display_content = task
            .display_artifact()
            .map(|artifact| artifact.text())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| task.status.state.as_str().to_string());
        draft.is_final = task.status.state.is_terminal();
        draft.source_agent = self.attributor.attribute(&AttributionHints {
            metadata: task.display_artifact().and_then(|a| a.metadata.as_ref()),
            event_metadata: task.metadata.as_ref(),
            description: None,
        });
        draft
    }

    fn status_draft(&self, update: &TaskStatusUpdateEvent) -> Draft {
        let mut draft = Draft::new(EventKind::Status);
        draft.task_id = update.task_id.clone();
        draft.context_id = update.context_id.clone();
        let message_text = update
            .status
            .message
            .as_ref()
            .map(Message::text)
            .unwrap_or_default();
        draft.display_content = if message_text.is_empty() {
            update.status.state.as_str().to_string()
        } else {
            message_text
        };
        draft.is_final = update.is_final || update.status.state.is_terminal();
        draft.source_agent = self.attributor.attribute(&AttributionHints {
            metadata: update.status.message.as_ref().and_then(|m| m.metadata.as_ref()),
            event_metadata: update.metadata.as_ref(),
            description: None,
        });
        draft
    }

    fn artifact_draft(&mut self, update: &TaskArtifactUpdateEvent) -> Draft {
        let artifact = &update.artifact;
        let kind = match artifact.name.as_deref() {
            Some(TOOL_START_ARTIFACT) => EventKind::ToolStart,
            Some(TOOL_END_ARTIFACT) => EventKind::ToolEnd,
            _ => EventKind::Artifact,
        };
        let mut draft = Draft::new(kind);
        draft.task_id = update.task_id.clone();
        draft.context_id = update.context_id.clone();
        draft.artifact_name = artifact.name.clone();
        draft.display_content = artifact.text();
        draft.should_append = update.append.unwrap_or(true);
        // Tool notifications announce activity; they never end an agent's content.
        if kind == EventKind::Artifact {
            draft.is_last_chunk = update.last_chunk.unwrap_or(false);
        }

        let attributed = self.attributor.attribute(&AttributionHints {
            metadata: artifact.metadata.as_ref(),
            event_metadata: update.metadata.as_ref(),
            description: artifact.description.as_deref(),
        });
        draft.source_agent = match artifact.artifact_id.as_deref() {
            Some(artifact_id) => self.sticky_agent(artifact_id, attributed),
            None => attributed,
        };
        draft
    }

    fn sticky_agent(&mut self, artifact_id: &str, attributed: Option<AgentId>) -> Option<AgentId> {
        match self.artifact_agents.get(artifact_id) {
            Some(known) => {
                if attributed.as_ref().is_some_and(|a| a != known) {
                    debug!(artifact_id, agent = %known, "ignoring re-attribution of artifact");
                }
                Some(known.clone())
            }
            None => {
                if let Some(agent) = &attributed {
                    self.artifact_agents
                        .insert(artifact_id.to_string(), agent.clone());
                }
                attributed
            }
        }
    }

    fn message_draft(&self, message: &Message) -> Draft {
        let mut draft = Draft::new(EventKind::Message);
        draft.task_id = message.task_id.clone();
        draft.context_id = message.context_id.clone();
        draft.display_content = message.text();
        draft.should_append = message.role == Role::Agent;
        draft.source_agent = self.attributor.attribute(&AttributionHints {
            metadata: message.metadata.as_ref(),
            event_metadata: None,
            description: None,
        });
        draft
    }

    fn build(&mut self, draft: Draft, raw: serde_json::Value) -> StreamEvent {
        let now = Utc::now();
        let timestamp = self.last_timestamp.map_or(now, |last| last.max(now));
        self.last_timestamp = Some(timestamp);

        StreamEvent {
            id: uuid::Uuid::new_v4(),
            timestamp,
            kind: draft.kind,
            task_id: draft.task_id,
            context_id: draft
                .context_id
                .filter(|id| !id.is_empty())
                .map_or_else(|| self.turn.clone(), TurnId::new),
            source_agent: draft.source_agent,
            artifact_name: draft.artifact_name,
            display_content: draft.display_content,
            should_append: draft.should_append,
            is_final: draft.is_final,
            is_last_chunk: draft.is_last_chunk,
            raw,
        }
    }
}

fn remote_error_draft(error: &JsonRpcError, turn: &TurnId) -> Draft {
    warn!(turn_id = %turn, code = error.code, message = %error.message, "remote runtime reported an error");
    let mut draft = Draft::new(EventKind::Error);
    draft.display_content = if error.message.is_empty() {
        format!("remote error {}", error.code)
    } else {
        error.message.clone()
    };
    draft.should_append = true;
    draft.is_final = true;
    draft
}
