use std::collections::HashMap;
use std::io::Write;

use agent_chat_stream::{AgentId, EventKind, StreamEvent, StreamFailure, StreamObserver};

/// Prints each agent's accumulated text as it grows.
///
/// Appended text is printed as a suffix; a replacement reprints the whole
/// text. A header line marks every switch between agents.
pub struct TerminalRenderer<W: Write> {
    out: W,
    shown: HashMap<AgentId, String>,
    current: Option<AgentId>,
    task_id: Option<String>,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            shown: HashMap::new(),
            current: None,
            task_id: None,
        }
    }

    /// First task id reported by the runtime, for a later `cancel`/`get`.
    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn switch_to(&mut self, agent: &AgentId) {
        if self.current.as_ref() != Some(agent) {
            let _ = write!(self.out, "\n[{agent}]\n");
            self.current = Some(agent.clone());
        }
    }
}

impl<W: Write> StreamObserver for TerminalRenderer<W> {
    fn on_event(&mut self, event: &StreamEvent, accumulated: &str) {
        if self.task_id.is_none() {
            self.task_id.clone_from(&event.task_id);
        }
        match event.kind {
            EventKind::ToolStart | EventKind::ToolEnd => {
                let _ = writeln!(self.out, "\n  · {}", event.display_content.trim());
                self.current = None;
                let _ = self.out.flush();
                return;
            }
            EventKind::Task | EventKind::Status => return,
            EventKind::Artifact | EventKind::Message | EventKind::Error => {}
        }

        let agent = event.agent();
        let previous = self.shown.get(&agent).cloned().unwrap_or_default();
        if accumulated == previous {
            return;
        }
        self.switch_to(&agent);
        match accumulated.strip_prefix(previous.as_str()) {
            Some(suffix) => {
                let _ = write!(self.out, "{suffix}");
            }
            None => {
                let _ = write!(self.out, "\n{accumulated}");
            }
        }
        let _ = self.out.flush();
        self.shown.insert(agent, accumulated.to_string());
    }

    fn on_complete(&mut self, incomplete: bool) {
        let _ = writeln!(self.out);
        if incomplete {
            eprintln!("(response incomplete: the runtime closed the stream early)");
        }
    }

    fn on_cancelled(&mut self) {
        let _ = writeln!(self.out);
        eprintln!("(cancelled)");
    }

    fn on_error(&mut self, failure: &StreamFailure) {
        let _ = writeln!(self.out);
        eprintln!("error: {failure}");
    }
}
