use crate::errors::ClientError;
use crate::model::TurnId;
use crate::protocol::Part;

/// Content sent to the remote runtime as part of a user message.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub enum InputPart {
    /// Plain text input.
    Text(String),
    /// Structured JSON input, sent as a `data` part.
    Json(serde_json::Value),
}

impl InputPart {
    fn to_wire(&self) -> Part {
        match self {
            Self::Text(text) => Part::Text { text: text.clone() },
            Self::Json(value) => Part::Data {
                data: value.clone(),
            },
        }
    }
}

/// A user message to stream to the runtime.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutgoingMessage {
    parts: Vec<InputPart>,
    metadata: Option<serde_json::Value>,
}

impl OutgoingMessage {
    /// Message with a single text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::default().with_text(text)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(InputPart::Text(text.into()));
        self
    }

    pub fn with_json(mut self, value: serde_json::Value) -> Self {
        self.parts.push(InputPart::Json(value));
        self
    }

    /// Attaches message-level metadata (forwarded verbatim).
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn parts(&self) -> &[InputPart] {
        &self.parts
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.parts.is_empty() {
            return Err(ClientError::Validation(
                "at least one input part is required".into(),
            ));
        }
        for part in &self.parts {
            if let InputPart::Text(text) = part
                && text.trim().is_empty()
            {
                return Err(ClientError::Validation(
                    "text input must not be empty".into(),
                ));
            }
        }
        Ok(())
    }

    /// `message/stream` params for this message in the given turn.
    pub(crate) fn to_params(&self, turn: &TurnId) -> serde_json::Value {
        let parts = self.parts.iter().map(InputPart::to_wire).collect::<Vec<_>>();
        let mut message = serde_json::json!({
            "kind": "message",
            "role": "user",
            "messageId": uuid::Uuid::new_v4().to_string(),
            "contextId": turn.as_str(),
            "parts": parts,
        });
        if let Some(metadata) = &self.metadata {
            message["metadata"] = metadata.clone();
        }
        serde_json::json!({ "message": message })
    }
}
