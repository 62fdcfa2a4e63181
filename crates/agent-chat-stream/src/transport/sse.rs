/// One complete server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the last `event:` line, if any.
    pub event: Option<String>,
    /// `data:` payload; multiple data lines are joined with `\n`.
    pub data: String,
}

impl SseFrame {
    /// Event type, defaulting to `message` when no `event:` line was seen.
    pub fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

#[derive(Debug, Default)]
struct PendingFrame {
    event: Option<String>,
    data: Option<String>,
}

impl PendingFrame {
    fn take(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        self.data.take().map(|data| SseFrame { event, data })
    }

    fn consume_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.take();
        }
        if line.starts_with(':') || line.trim().is_empty() {
            return None;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            self.event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            match self.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(rest);
                }
                None => self.data = Some(rest.to_string()),
            }
        }
        None
    }
}

/// Incremental SSE frame reconstruction over decoded text.
///
/// Text may be pushed at arbitrary boundaries; only complete frames are
/// returned.
#[derive(Debug, Default)]
pub struct SseFrameParser {
    buf: String,
    pending: PendingFrame,
}

impl SseFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends decoded text and returns every frame completed by it.
    pub fn push(&mut self, text: &str) -> Vec<SseFrame> {
        self.buf.push_str(text);
        let Self { buf, pending } = self;

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = buf[start..].find('\n') {
            let end = start + offset;
            let line = buf[start..end].trim_end_matches('\r');
            if let Some(frame) = pending.consume_line(line) {
                frames.push(frame);
            }
            start = end + 1;
        }
        buf.drain(..start);
        frames
    }

    /// Ends the stream, flushing a data field left without a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let tail = std::mem::take(&mut self.buf);
        let line = tail.trim_end_matches('\r');
        if let Some(frame) = self.pending.consume_line(line) {
            return Some(frame);
        }
        self.pending.take()
    }

    /// Drops any buffered, incomplete frame.
    pub fn discard(&mut self) {
        self.buf.clear();
        self.pending = PendingFrame::default();
    }

    /// True when text or a pending field is buffered.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty() || self.pending.data.is_some() || self.pending.event.is_some()
    }
}
