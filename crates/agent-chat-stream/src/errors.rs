use std::time::Duration;

/// Errors produced while pulling bytes from a response body.
///
/// Caller-initiated cancellation is kept apart from network failure so the
/// session layer can report it on the benign path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The read was unblocked by the cancellation signal.
    #[error("transport cancelled")]
    Cancelled,
    /// The underlying connection failed.
    #[error("network error: {0}")]
    Network(String),
    /// The byte stream could not be decoded as text.
    #[error("decode error: {0}")]
    Decode(String),
}

impl TransportError {
    /// Creates a network error from any displayable cause.
    pub fn network(cause: impl std::fmt::Display) -> Self {
        Self::Network(cause.to_string())
    }
}

/// Hard failure of an established event stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum StreamFailure {
    /// The connection dropped or a read failed.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// No frame arrived within the inactivity window.
    #[error("no activity for {window:?}; connection presumed stuck")]
    TimedOut { window: Duration },
    /// The response body was not valid text.
    #[error("decode failure: {message}")]
    Decode { message: String },
}

impl StreamFailure {
    pub(crate) fn from_transport(err: TransportError) -> Option<Self> {
        match err {
            TransportError::Cancelled => None,
            TransportError::Network(message) => Some(Self::Transport { message }),
            TransportError::Decode(message) => Some(Self::Decode { message }),
        }
    }
}

/// Top-level error type for client calls made outside an established stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// The remote runtime answered with a non-success HTTP status.
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    /// The request could not be sent or its response not read.
    #[error("transport error: {0}")]
    Transport(String),
    /// The remote runtime answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The response did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The request was aborted before a response arrived.
    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timeout: {err}"))
        } else if err.is_connect() {
            Self::Transport(format!("connection failed: {err}"))
        } else {
            Self::Transport(format!("request failed: {err}"))
        }
    }
}
