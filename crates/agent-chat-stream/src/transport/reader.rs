use std::io;
use std::pin::Pin;

use bytes::BytesMut;
use futures::{StreamExt as _, TryStreamExt as _};
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::utf8::Utf8Decoder;
use crate::errors::TransportError;

/// Raw response body as a stream of byte chunks.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// Pulls decoded text increments from a response body.
///
/// Both strategies unblock promptly when the cancellation token fires and
/// report it as `TransportError::Cancelled`.
#[async_trait::async_trait]
pub trait TransportReader: Send {
    /// Returns the next text increment, or `None` at end of stream.
    async fn pull(&mut self) -> Result<Option<String>, TransportError>;

    /// Releases the underlying body. Further pulls return `None`.
    fn release(&mut self);
}

/// How response bodies are turned into text for one client instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderStrategy {
    /// Byte stream piped through a line codec.
    #[default]
    Pipe,
    /// Chunk-by-chunk reads with an explicit stateful decoder.
    Manual,
}

impl ReaderStrategy {
    /// Picks a strategy from a client user agent.
    ///
    /// Safari's body stream cannot be piped through a text decoder, so it
    /// gets the manual reader. Chromium-based and Android browsers also
    /// advertise `Safari` and are excluded.
    pub fn for_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        let is_safari = ua.contains("safari")
            && !ua.contains("chrome")
            && !ua.contains("chromium")
            && !ua.contains("crios")
            && !ua.contains("android");
        if is_safari { Self::Manual } else { Self::Pipe }
    }

    /// Parses `pipe` / `manual`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pipe" => Some(Self::Pipe),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }

    /// Wraps a body in the reader for this strategy.
    pub fn open(self, body: ByteStream, cancel: CancellationToken) -> Box<dyn TransportReader> {
        match self {
            Self::Pipe => Box::new(PipeReader::new(body, cancel)),
            Self::Manual => Box::new(ManualReader::new(body, cancel)),
        }
    }
}

type Lines = FramedRead<StreamReader<IoByteStream, bytes::Bytes>, LossyLinesCodec>;
type IoByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, io::Error>> + Send + 'static>>;

/// Line-codec pipeline over the body. Yields one line (newline restored) per
/// pull. Invalid UTF-8 is replaced, as in `ManualReader`.
pub struct PipeReader {
    lines: Option<Lines>,
    cancel: CancellationToken,
}

impl PipeReader {
    pub fn new(body: ByteStream, cancel: CancellationToken) -> Self {
        let io_stream: IoByteStream = Box::pin(body.map_err(io::Error::other));
        Self {
            lines: Some(FramedRead::new(
                StreamReader::new(io_stream),
                LossyLinesCodec::default(),
            )),
            cancel,
        }
    }
}

/// Newline-delimited decoder that substitutes U+FFFD for invalid UTF-8, so
/// a bad byte spoils one line instead of the whole body.
#[derive(Debug, Default)]
struct LossyLinesCodec {
    /// Bytes already scanned for a newline.
    next_index: usize,
}

impl Decoder for LossyLinesCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        let Some(offset) = buf[self.next_index..].iter().position(|b| *b == b'\n') else {
            self.next_index = buf.len();
            return Ok(None);
        };
        let line = buf.split_to(self.next_index + offset + 1);
        self.next_index = 0;
        Ok(Some(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split_to(buf.len());
        Ok(Some(String::from_utf8_lossy(&rest).into_owned()))
    }
}

fn transport_error_from_io(err: io::Error) -> TransportError {
    match err.into_inner() {
        Some(inner) => match inner.downcast::<TransportError>() {
            Ok(original) => *original,
            Err(other) => TransportError::network(other),
        },
        None => TransportError::Network("body read failed".into()),
    }
}

#[async_trait::async_trait]
impl TransportReader for PipeReader {
    async fn pull(&mut self) -> Result<Option<String>, TransportError> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };
        let next = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            next = lines.next() => Some(next),
        };
        let Some(next) = next else {
            self.release();
            return Err(TransportError::Cancelled);
        };
        match next {
            Some(Ok(mut line)) => {
                line.push('\n');
                Ok(Some(line))
            }
            Some(Err(err)) => {
                self.release();
                Err(transport_error_from_io(err))
            }
            None => {
                self.release();
                Ok(None)
            }
        }
    }

    fn release(&mut self) {
        if self.lines.take().is_some() {
            debug!("pipe reader released");
        }
    }
}

/// Explicit chunk reader with a stateful UTF-8 decoder.
pub struct ManualReader {
    body: Option<ByteStream>,
    decoder: Utf8Decoder,
    cancel: CancellationToken,
}

impl ManualReader {
    pub fn new(body: ByteStream, cancel: CancellationToken) -> Self {
        Self {
            body: Some(body),
            decoder: Utf8Decoder::new(),
            cancel,
        }
    }
}

#[async_trait::async_trait]
impl TransportReader for ManualReader {
    async fn pull(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let Some(body) = self.body.as_mut() else {
                return Ok(None);
            };
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                next = body.next() => Some(next),
            };
            let Some(next) = next else {
                self.release();
                return Err(TransportError::Cancelled);
            };
            match next {
                Some(Ok(chunk)) => {
                    let text = self.decoder.decode(&chunk);
                    if text.is_empty() {
                        continue;
                    }
                    return Ok(Some(text));
                }
                Some(Err(err)) => {
                    self.release();
                    return Err(err);
                }
                None => {
                    let tail = self.decoder.flush();
                    self.release();
                    return Ok((!tail.is_empty()).then_some(tail));
                }
            }
        }
    }

    fn release(&mut self) {
        if self.body.take().is_some() {
            debug!("manual reader released");
        }
    }
}
