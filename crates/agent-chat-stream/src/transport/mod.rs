//! Response-body reading and SSE frame reconstruction.
//!
//! Readers turn raw bytes into decoded text increments; the frame parser turns
//! those increments into complete `SseFrame`s regardless of chunk boundaries.
mod reader;
mod sse;
mod utf8;

pub use reader::{ByteStream, ManualReader, PipeReader, ReaderStrategy, TransportReader};
pub use sse::{SseFrame, SseFrameParser};
pub use utf8::Utf8Decoder;
