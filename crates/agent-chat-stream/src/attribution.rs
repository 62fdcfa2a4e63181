//! Sub-agent attribution for classified events.
//!
//! The runtime does not tag every event with structured attribution, so the
//! default attributor falls back to pattern matching on the artifact
//! description. Unmatched text yields no attribution; the supervisor bucket is
//! applied later by consumers.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::AgentId;

/// Metadata keys checked, in order, for an explicit agent name.
const METADATA_KEYS: [&str; 4] = ["sourceAgent", "source_agent", "agentName", "agent_name"];

/// Placeholder some runtimes emit instead of a real agent name.
const PLACEHOLDER_AGENT: &str = "sub-agent";

static TOOL_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)tool call (?:started|completed):\s*([\w\-]+)").expect("valid regex")
});

/// "From <agent>" only as a leading phrase: start of a line or sentence,
/// capitalised. Lower-case "from" inside prose is not attribution.
static FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(?:^|[.!?]\s+)From\s+([\w\-]+)").expect("valid regex")
});

/// Inputs available for attributing one event.
#[derive(Clone, Copy, Debug, Default)]
pub struct AttributionHints<'a> {
    /// Metadata attached to the artifact or message.
    pub metadata: Option<&'a serde_json::Value>,
    /// Metadata attached to the enclosing update event.
    pub event_metadata: Option<&'a serde_json::Value>,
    /// Human-readable description text.
    pub description: Option<&'a str>,
}

/// Resolves the sub-agent an event came from.
pub trait Attributor: Send + Sync {
    fn attribute(&self, hints: &AttributionHints<'_>) -> Option<AgentId>;
}

/// Uses only explicit attribution metadata.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetadataAttributor;

impl Attributor for MetadataAttributor {
    fn attribute(&self, hints: &AttributionHints<'_>) -> Option<AgentId> {
        [hints.metadata, hints.event_metadata]
            .into_iter()
            .flatten()
            .find_map(agent_from_metadata)
    }
}

/// Explicit metadata first, then description patterns.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicAttributor;

impl Attributor for HeuristicAttributor {
    fn attribute(&self, hints: &AttributionHints<'_>) -> Option<AgentId> {
        MetadataAttributor
            .attribute(hints)
            .or_else(|| hints.description.and_then(agent_from_description))
    }
}

fn agent_from_metadata(metadata: &serde_json::Value) -> Option<AgentId> {
    METADATA_KEYS
        .iter()
        .filter_map(|key| metadata.get(key).and_then(|v| v.as_str()))
        .find_map(AgentId::normalize)
}

/// Extracts an agent from "Tool call started/completed: <agent>" or
/// "From <agent>" phrasings.
pub fn agent_from_description(description: &str) -> Option<AgentId> {
    [&*TOOL_CALL_RE, &*FROM_RE].into_iter().find_map(|re| {
        re.captures(description)
            .and_then(|caps| caps.get(1))
            .and_then(|m| AgentId::normalize(m.as_str()))
            .filter(|agent| agent.as_str() != PLACEHOLDER_AGENT)
    })
}
