//! Running display text per (turn, agent).
use std::collections::HashMap;

use tracing::debug;

use crate::model::{AgentId, TurnId};
use crate::stream::StreamEvent;

/// Accumulated text for one (turn, agent) pair.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct AccumulatedContent {
    pub text: String,
    pub is_final: bool,
}

#[derive(Debug, Default)]
struct TurnContent {
    /// Agents in the order their first event arrived.
    order: Vec<AgentId>,
    entries: HashMap<AgentId, AccumulatedContent>,
}

/// Folds stream events into per-(turn, agent) text.
///
/// Pure state: no I/O and no timers.
#[derive(Debug, Default)]
pub struct ContentAccumulator {
    turns: HashMap<TurnId, TurnContent>,
}

impl ContentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event and returns the updated text of its (turn, agent).
    ///
    /// Once the pair is final every further fold is a no-op. A replace event
    /// overwrites the text; an append event is skipped when its content is
    /// already contained in the text (retransmission). A terminal event
    /// freezes the pair after its content is applied.
    pub fn fold(&mut self, event: &StreamEvent) -> &str {
        let agent = event.agent();
        let turn = self.turns.entry(event.context_id.clone()).or_default();
        if !turn.entries.contains_key(&agent) {
            turn.order.push(agent.clone());
        }
        let entry = turn.entries.entry(agent).or_default();

        if entry.is_final {
            debug!(turn_id = %event.context_id, kind = ?event.kind, "ignoring event for finalized stream");
            return &entry.text;
        }

        if event.carries_content() {
            let content = event.display_content.as_str();
            if !event.should_append {
                entry.text = content.to_string();
            } else if !content.is_empty() && !entry.text.contains(content) {
                entry.text.push_str(content);
            }
        }

        if event.is_terminal() {
            entry.is_final = true;
        }
        &entry.text
    }

    /// Current text for a (turn, agent) pair.
    pub fn text(&self, turn: &TurnId, agent: &AgentId) -> Option<&str> {
        self.entry(turn, agent).map(|e| e.text.as_str())
    }

    pub fn is_final(&self, turn: &TurnId, agent: &AgentId) -> bool {
        self.entry(turn, agent).is_some_and(|e| e.is_final)
    }

    pub fn entry(&self, turn: &TurnId, agent: &AgentId) -> Option<&AccumulatedContent> {
        self.turns.get(turn).and_then(|t| t.entries.get(agent))
    }

    /// Agents that contributed to a turn, in first-seen order.
    pub fn agents(&self, turn: &TurnId) -> &[AgentId] {
        self.turns
            .get(turn)
            .map(|t| t.order.as_slice())
            .unwrap_or_default()
    }

    /// All (agent, content) pairs of a turn, in first-seen order.
    pub fn snapshot(&self, turn: &TurnId) -> Vec<(AgentId, AccumulatedContent)> {
        let Some(content) = self.turns.get(turn) else {
            return Vec::new();
        };
        content
            .order
            .iter()
            .filter_map(|agent| {
                content
                    .entries
                    .get(agent)
                    .map(|entry| (agent.clone(), entry.clone()))
            })
            .collect()
    }

    /// True when any agent in the turn received a terminal event.
    pub fn has_terminal(&self, turn: &TurnId) -> bool {
        self.turns
            .get(turn)
            .is_some_and(|t| t.entries.values().any(|e| e.is_final))
    }

    /// Drops everything held for a turn.
    pub fn discard_turn(&mut self, turn: &TurnId) {
        self.turns.remove(turn);
    }
}
