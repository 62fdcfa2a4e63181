use std::fmt;

/// Bucket name used for events that carry no sub-agent attribution.
pub const SUPERVISOR_AGENT: &str = "supervisor";

/// Identifier for one conversation turn (the A2A `contextId`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TurnId(pub String);

impl TurnId {
    /// Creates a turn id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Creates a fresh random turn id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the turn id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TurnId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TurnId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Normalized sub-agent identifier: lowercase, no whitespace.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AgentId(String);

impl AgentId {
    /// Normalizes a raw agent name.
    ///
    /// Returns `None` when nothing but whitespace is left. Internal whitespace
    /// runs collapse to `_`.
    pub fn normalize(raw: &str) -> Option<Self> {
        let joined = raw.split_whitespace().collect::<Vec<_>>().join("_");
        if joined.is_empty() {
            return None;
        }
        Some(Self(joined.to_lowercase()))
    }

    /// The implicit bucket for unattributed events.
    pub fn supervisor() -> Self {
        Self(SUPERVISOR_AGENT.to_string())
    }

    /// Returns the agent id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
