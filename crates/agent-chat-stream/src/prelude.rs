//! Common imports for typical client usage.
pub use crate::{
    A2aClient, AgentId, ClientConfig, ClientError, ContentAccumulator, EventKind, EventStream,
    OutgoingMessage, SessionController, StreamEvent, StreamFailure, StreamObserver, StreamOutcome,
    TurnId,
};
