//! Streaming client core for A2A agent runtimes.
//!
//! Sends a user message over JSON-RPC `message/stream`, reads the SSE
//! response incrementally, classifies every frame into a `StreamEvent`
//! attributed to the sub-agent that produced it, and folds events into
//! per-agent display text.
//!
//! # Usage
//!
//! ```no_run
//! use agent_chat_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = A2aClient::new(ClientConfig::new("http://localhost:8000/"))?;
//! let session = client.session();
//! let turn = TurnId::generate();
//!
//! let mut stream = session.send(OutgoingMessage::text("list open PRs"), turn.clone()).await?;
//! let mut content = ContentAccumulator::new();
//! while let Some(event) = stream.next_event().await {
//!     let text = content.fold(&event);
//!     println!("[{}] {text}", event.agent());
//! }
//! if stream.outcome().is_some_and(StreamOutcome::shows_error_banner) {
//!     eprintln!("stream failed: {:?}", stream.outcome());
//! }
//! # Ok(())
//! # }
//! ```

/// Per-(turn, agent) text accumulation.
pub mod accumulator;
/// Sub-agent attribution.
pub mod attribution;
/// Frame classification.
pub mod classify;
/// HTTP client for the remote runtime.
pub mod client;
/// Client configuration.
pub mod config;
/// Outbound message content.
pub mod content;
/// Error types.
pub mod errors;
/// Turn and agent identifiers.
pub mod model;
/// Tracing initialisation.
pub mod observability;
/// Common imports.
pub mod prelude;
/// A2A JSON-RPC wire model.
pub mod protocol;
/// Session controller and event stream.
pub mod session;
/// Classified events and stream outcomes.
pub mod stream;
/// Body readers and SSE framing.
pub mod transport;
/// Inactivity watchdog.
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;

pub use accumulator::{AccumulatedContent, ContentAccumulator};
pub use attribution::{AttributionHints, Attributor, HeuristicAttributor, MetadataAttributor};
pub use classify::Classifier;
pub use client::A2aClient;
pub use config::ClientConfig;
pub use content::{InputPart, OutgoingMessage};
pub use errors::{ClientError, StreamFailure, TransportError};
pub use model::{AgentId, SUPERVISOR_AGENT, TurnId};
pub use observability::init_observability;
pub use session::{AbortHandle, EventStream, SessionController};
pub use stream::{EventKind, StreamEvent, StreamObserver, StreamOutcome};
pub use transport::ReaderStrategy;
pub use watchdog::{Watchdog, WatchdogState};
