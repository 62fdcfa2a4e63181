//! Session controller and the event stream it hands out.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::accumulator::ContentAccumulator;
use crate::attribution::Attributor;
use crate::client::A2aClient;
use crate::classify::Classifier;
use crate::content::OutgoingMessage;
use crate::errors::{ClientError, StreamFailure};
use crate::model::TurnId;
use crate::protocol::Task;
use crate::stream::{StreamEvent, StreamObserver, StreamOutcome};
use crate::transport::{ByteStream, ReaderStrategy, SseFrame, SseFrameParser, TransportReader};
use crate::watchdog::Watchdog;

/// Owns at most one in-flight stream for a conversation.
///
/// A new `send` aborts the stream started by the previous one.
pub struct SessionController {
    client: A2aClient,
    active: Mutex<Option<InFlight>>,
}

struct InFlight {
    id: uuid::Uuid,
    token: CancellationToken,
}

impl SessionController {
    pub(crate) fn new(client: A2aClient) -> Self {
        Self {
            client,
            active: Mutex::new(None),
        }
    }

    /// Sends a message for `turn` and returns its event stream.
    ///
    /// Any stream still running for this controller is aborted first.
    pub async fn send(
        &self,
        message: OutgoingMessage,
        turn: TurnId,
    ) -> Result<EventStream, ClientError> {
        message.validate()?;
        let cancel = CancellationToken::new();
        let id = uuid::Uuid::new_v4();
        let previous = self.swap_active(Some(InFlight {
            id,
            token: cancel.clone(),
        }));
        if let Some(previous) = previous {
            debug!(turn_id = %turn, "superseding in-flight stream");
            previous.token.cancel();
        }

        info!(turn_id = %turn, parts = message.parts().len(), "sending message");
        let body = match self.client.open_stream(&message, &turn, &cancel).await {
            Ok(body) => body,
            Err(err) => {
                if !matches!(err, ClientError::Cancelled) {
                    error!(turn_id = %turn, error = %err, "message stream request failed");
                }
                self.clear_if_current(id);
                return Err(err);
            }
        };

        let config = self.client.config();
        Ok(EventStream::new(
            body,
            config.reader_strategy,
            turn,
            self.client.attributor(),
            config.inactivity_timeout,
            cancel,
        ))
    }

    /// Aborts the in-flight stream, if any. Idempotent.
    pub fn abort(&self) {
        if let Some(in_flight) = self.swap_active(None) {
            debug!("aborting in-flight stream");
            in_flight.token.cancel();
        }
    }

    /// True while the latest stream is neither finished nor aborted.
    pub fn is_streaming(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|in_flight| !in_flight.token.is_cancelled())
    }

    /// Asks the runtime to cancel a task.
    ///
    /// Does not touch the local stream; call `abort` as well to tear it down.
    /// Failures are logged and reported as `false`.
    pub async fn cancel_remote_task(&self, task_id: &str) -> bool {
        match self.client.cancel_task(task_id).await {
            Ok(task) => {
                info!(task_id, state = task.status.state.as_str(), "remote task cancel requested");
                true
            }
            Err(err) => {
                warn!(task_id, error = %err, "remote task cancel failed");
                false
            }
        }
    }

    /// Fetches a task snapshot from the runtime.
    pub async fn get_task(&self, task_id: &str) -> Result<Task, ClientError> {
        self.client.get_task(task_id, None).await
    }

    fn swap_active(&self, next: Option<InFlight>) -> Option<InFlight> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *active, next)
    }

    fn clear_if_current(&self, id: uuid::Uuid) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|current| current.id == id) {
            *active = None;
        }
    }
}

/// Handle that aborts one `EventStream` from another task.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.token.cancel();
    }
}

/// Pull-based feed of classified events for one turn.
///
/// Reads the body, splits it into frames and classifies them on demand.
/// Once `next_event` returns `None` the stream is finished and `outcome`
/// says why.
pub struct EventStream {
    turn: TurnId,
    reader: Box<dyn TransportReader>,
    parser: SseFrameParser,
    classifier: Classifier,
    pending: VecDeque<SseFrame>,
    watchdog: Option<Watchdog>,
    cancel: CancellationToken,
    body_done: bool,
    saw_terminal: bool,
    outcome: Option<StreamOutcome>,
}

impl EventStream {
    pub(crate) fn new(
        body: ByteStream,
        strategy: ReaderStrategy,
        turn: TurnId,
        attributor: Arc<dyn Attributor>,
        inactivity_window: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reader: strategy.open(body, cancel.clone()),
            parser: SseFrameParser::new(),
            classifier: Classifier::new(turn.clone(), attributor),
            pending: VecDeque::new(),
            watchdog: Some(Watchdog::new(inactivity_window)),
            cancel,
            body_done: false,
            saw_terminal: false,
            outcome: None,
            turn,
        }
    }

    pub fn turn(&self) -> &TurnId {
        &self.turn
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            token: self.cancel.clone(),
        }
    }

    /// Terminal result, once `next_event` has returned `None`.
    pub fn outcome(&self) -> Option<&StreamOutcome> {
        self.outcome.as_ref()
    }

    /// Waits for the next event. Returns `None` once the stream is finished.
    ///
    /// After cancellation no further events are produced, including for
    /// frames that were already received but not yet returned.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if self.outcome.is_some() {
                return None;
            }
            if self.cancel.is_cancelled() {
                self.close_cancelled();
                continue;
            }
            if let Some(frame) = self.pending.pop_front() {
                let Some(event) = self.classifier.classify(&frame) else {
                    continue;
                };
                if event.is_terminal() {
                    self.saw_terminal = true;
                }
                return Some(event);
            }
            if self.body_done {
                self.close_completed();
                continue;
            }
            self.pull_frames().await;
        }
    }

    /// Feeds every event through `accumulator` and `observer` until the
    /// stream finishes, then reports the outcome.
    pub async fn drive<O>(
        mut self,
        observer: &mut O,
        accumulator: &mut ContentAccumulator,
    ) -> StreamOutcome
    where
        O: StreamObserver + ?Sized,
    {
        while let Some(event) = self.next_event().await {
            let text = accumulator.fold(&event);
            observer.on_event(&event, text);
        }
        let outcome = self
            .outcome
            .take()
            .unwrap_or(StreamOutcome::Completed { incomplete: true });
        match &outcome {
            StreamOutcome::Completed { incomplete } => observer.on_complete(*incomplete),
            StreamOutcome::Cancelled => observer.on_cancelled(),
            StreamOutcome::Failed(failure) => observer.on_error(failure),
        }
        outcome
    }

    /// Adapts the pull API to a `futures::Stream`. The outcome is not
    /// observable through the adapter.
    pub fn into_stream(self) -> impl futures::Stream<Item = StreamEvent> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            let event = stream.next_event().await?;
            Some((event, stream))
        })
    }

    async fn pull_frames(&mut self) {
        let Some(watchdog) = self.watchdog.as_mut() else {
            self.body_done = true;
            return;
        };
        let pulled = tokio::select! {
            biased;
            pulled = self.reader.pull() => Some(pulled),
            () = watchdog.expired() => None,
        };
        match pulled {
            Some(Ok(Some(text))) => {
                watchdog.reset();
                self.pending.extend(self.parser.push(&text));
            }
            Some(Ok(None)) => {
                self.pending.extend(self.parser.finish());
                self.body_done = true;
            }
            Some(Err(err)) => match StreamFailure::from_transport(err) {
                Some(failure) => {
                    error!(turn_id = %self.turn, error = %failure, "stream transport failed");
                    self.close(StreamOutcome::Failed(failure));
                }
                None => self.close_cancelled(),
            },
            None => {
                let window = watchdog.window();
                warn!(turn_id = %self.turn, window_secs = window.as_secs(), "no stream activity within the inactivity window; aborting");
                self.close(StreamOutcome::Failed(StreamFailure::TimedOut { window }));
            }
        }
    }

    fn close_cancelled(&mut self) {
        if self.parser.has_partial() || !self.pending.is_empty() {
            debug!(turn_id = %self.turn, buffered = self.pending.len(), "discarding buffered frames");
        }
        self.parser.discard();
        self.pending.clear();
        info!(turn_id = %self.turn, "stream cancelled");
        self.close(StreamOutcome::Cancelled);
    }

    fn close_completed(&mut self) {
        if !self.saw_terminal {
            warn!(turn_id = %self.turn, "response incomplete: stream ended without a terminal event");
        } else {
            debug!(turn_id = %self.turn, "stream completed");
        }
        self.close(StreamOutcome::Completed {
            incomplete: !self.saw_terminal,
        });
    }

    fn close(&mut self, outcome: StreamOutcome) {
        self.reader.release();
        self.watchdog = None;
        self.cancel.cancel();
        self.outcome = Some(outcome);
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::HeuristicAttributor;
    use crate::config::ClientConfig;
    use crate::model::AgentId;
    use crate::stream::EventKind;
    use crate::testing::{BodyTail, Reply, TestServer, scripted_body, scripted_bytes};

    const WINDOW: Duration = Duration::from_secs(60);

    fn artifact(text: &str, append: bool, last: bool) -> String {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": "1",
            "result": {
                "kind": "artifact-update",
                "taskId": "task-1",
                "contextId": "turn-1",
                "artifact": {"artifactId": "a1", "parts": [{"kind": "text", "text": text}]},
                "append": append,
                "lastChunk": last
            }
        });
        format!("data: {payload}\n\n")
    }

    fn stream_over(body: ByteStream, strategy: ReaderStrategy) -> EventStream {
        EventStream::new(
            body,
            strategy,
            TurnId::new("turn-1"),
            Arc::new(HeuristicAttributor),
            WINDOW,
            CancellationToken::new(),
        )
    }

    async fn drain(stream: &mut EventStream) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            events.push(event);
        }
        events
    }

    #[derive(Default)]
    struct Recorder {
        texts: Vec<(AgentId, String)>,
        completed: Option<bool>,
        cancelled: bool,
        failure: Option<StreamFailure>,
    }

    impl StreamObserver for Recorder {
        fn on_event(&mut self, event: &StreamEvent, accumulated: &str) {
            self.texts.push((event.agent(), accumulated.to_string()));
        }

        fn on_complete(&mut self, incomplete: bool) {
            self.completed = Some(incomplete);
        }

        fn on_cancelled(&mut self) {
            self.cancelled = true;
        }

        fn on_error(&mut self, failure: &StreamFailure) {
            self.failure = Some(failure.clone());
        }
    }

    #[tokio::test]
    async fn hello_world_across_chunk_boundaries() {
        for strategy in [ReaderStrategy::Pipe, ReaderStrategy::Manual] {
            let first = artifact("Hello", false, false);
            let second = artifact(" world", true, true);
            let wire = format!("{first}{second}");
            let (a, rest) = wire.split_at(17);
            let (b, c) = rest.split_at(first.len());
            let stream = stream_over(scripted_body(&[a, b, c], BodyTail::End), strategy);

            let mut recorder = Recorder::default();
            let mut acc = ContentAccumulator::new();
            let outcome = stream.drive(&mut recorder, &mut acc).await;

            assert_eq!(outcome, StreamOutcome::Completed { incomplete: false });
            assert_eq!(recorder.completed, Some(false));
            assert_eq!(
                acc.text(&TurnId::new("turn-1"), &AgentId::supervisor()),
                Some("Hello world")
            );
            assert!(acc.is_final(&TurnId::new("turn-1"), &AgentId::supervisor()));
        }
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped() {
        let first = artifact("first", true, false);
        let second = artifact("second", true, true);
        let mut stream = stream_over(
            scripted_body(
                &[
                    first.as_str(),
                    "data: {not json\n\n",
                    ": keep-alive\n\n",
                    second.as_str(),
                ],
                BodyTail::End,
            ),
            ReaderStrategy::Pipe,
        );
        let events = drain(&mut stream).await;
        let contents: Vec<_> = events.iter().map(|e| e.display_content.as_str()).collect();
        assert_eq!(contents, ["first", "second"]);
        assert_eq!(
            stream.outcome(),
            Some(&StreamOutcome::Completed { incomplete: false })
        );
    }

    #[tokio::test]
    async fn invalid_utf8_frame_does_not_end_the_stream() {
        let first = artifact("one", true, false);
        let second = artifact("two", true, true);
        for strategy in [ReaderStrategy::Pipe, ReaderStrategy::Manual] {
            let mut stream = stream_over(
                scripted_bytes(
                    &[
                        first.as_bytes(),
                        b"data: {\"bad\":\"\xff\"}\n\n",
                        second.as_bytes(),
                    ],
                    BodyTail::End,
                ),
                strategy,
            );
            let events = drain(&mut stream).await;
            let contents: Vec<_> = events.iter().map(|e| e.display_content.as_str()).collect();
            assert_eq!(contents, ["one", "two"], "{strategy:?}");
            assert_eq!(
                stream.outcome(),
                Some(&StreamOutcome::Completed { incomplete: false }),
                "{strategy:?}"
            );
        }
    }

    #[tokio::test]
    async fn end_without_terminal_event_is_incomplete() {
        let mut stream = stream_over(
            scripted_body(&[artifact("partial", true, false).as_str()], BodyTail::End),
            ReaderStrategy::Manual,
        );
        assert_eq!(drain(&mut stream).await.len(), 1);
        assert_eq!(
            stream.outcome(),
            Some(&StreamOutcome::Completed { incomplete: true })
        );
    }

    #[tokio::test]
    async fn abort_discards_buffered_frames() {
        let wire = format!(
            "{}{}{}data: {{\"jsonrpc\":\"2.0\",\"res",
            artifact("one", true, false),
            artifact("two", true, false),
            artifact("three", true, false),
        );
        for strategy in [ReaderStrategy::Pipe, ReaderStrategy::Manual] {
            let mut stream = stream_over(scripted_body(&[wire.as_str()], BodyTail::Hang), strategy);
            let first = stream.next_event().await.expect("first event");
            assert_eq!(first.display_content, "one");

            stream.abort_handle().abort();
            assert!(stream.next_event().await.is_none());
            assert!(stream.next_event().await.is_none());
            assert_eq!(stream.outcome(), Some(&StreamOutcome::Cancelled));
            assert!(!stream.outcome().is_some_and(StreamOutcome::shows_error_banner));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silence_past_the_window_times_out() {
        let mut stream = stream_over(
            scripted_body(&[artifact("working...", true, false).as_str()], BodyTail::Hang),
            ReaderStrategy::Pipe,
        );
        let started = tokio::time::Instant::now();
        assert_eq!(drain(&mut stream).await.len(), 1);
        assert!(started.elapsed() >= WINDOW);
        assert_eq!(
            stream.outcome(),
            Some(&StreamOutcome::Failed(StreamFailure::TimedOut { window: WINDOW }))
        );
    }

    #[tokio::test]
    async fn network_failure_is_not_cancellation() {
        let stream = stream_over(
            scripted_body(&[artifact("half", true, false).as_str()], BodyTail::Fail("connection reset")),
            ReaderStrategy::Manual,
        );
        let mut recorder = Recorder::default();
        let outcome = stream.drive(&mut recorder, &mut ContentAccumulator::new()).await;
        assert!(outcome.shows_error_banner());
        assert!(!recorder.cancelled);
        assert!(matches!(
            recorder.failure,
            Some(StreamFailure::Transport { message }) if message.contains("connection reset")
        ));
        assert_eq!(recorder.texts.len(), 1);
    }

    #[tokio::test]
    async fn remote_error_is_surfaced_inline() {
        let frames = [
            artifact("Partial answer", true, false),
            "data: {\"jsonrpc\":\"2.0\",\"id\":\"1\",\"error\":{\"code\":-32000,\"message\":\"agent crashed\"}}\n\n".to_string(),
        ];
        let chunks: Vec<&str> = frames.iter().map(String::as_str).collect();
        let stream = stream_over(scripted_body(&chunks, BodyTail::End), ReaderStrategy::Pipe);
        let mut recorder = Recorder::default();
        let mut acc = ContentAccumulator::new();
        let outcome = stream.drive(&mut recorder, &mut acc).await;
        assert_eq!(outcome, StreamOutcome::Completed { incomplete: false });
        let (_, text) = recorder.texts.last().expect("events");
        assert_eq!(text, "Partial answeragent crashed");
    }

    #[tokio::test]
    async fn send_posts_json_rpc_and_streams_events() {
        let server = TestServer::start(vec![Reply::sse(&[
            ": connected\n\n",
            artifact("Hel", true, false).as_str(),
            artifact("lo", true, true).as_str(),
        ])])
        .await;
        let client = A2aClient::new(ClientConfig::new(&server.endpoint)).expect("client");
        let session = client.session();

        let mut stream = session
            .send(OutgoingMessage::text("hi"), TurnId::new("turn-1"))
            .await
            .expect("stream");
        assert!(session.is_streaming());
        let events = drain(&mut stream).await;
        assert!(!session.is_streaming());
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == EventKind::Artifact));
        assert_eq!(
            stream.outcome(),
            Some(&StreamOutcome::Completed { incomplete: false })
        );

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.header("accept"), Some("text/event-stream"));
        assert_eq!(request.header("cache-control"), Some("no-cache"));
        assert_eq!(request.header("connection"), Some("keep-alive"));
        assert_eq!(request.body["jsonrpc"], "2.0");
        assert_eq!(request.body["method"], "message/stream");
        assert_eq!(request.body["params"]["message"]["contextId"], "turn-1");
        assert_eq!(
            request.body["params"]["message"]["parts"][0],
            serde_json::json!({"kind": "text", "text": "hi"})
        );
    }

    #[tokio::test]
    async fn new_send_aborts_the_previous_stream() {
        let server = TestServer::start(vec![
            Reply::sse_open(&[artifact("first", true, false).as_str()]),
            Reply::sse(&[artifact("second", true, true).as_str()]),
        ])
        .await;
        let client = A2aClient::new(ClientConfig::new(&server.endpoint)).expect("client");
        let session = client.session();

        let mut first = session
            .send(OutgoingMessage::text("one"), TurnId::new("turn-1"))
            .await
            .expect("first stream");
        assert_eq!(
            first.next_event().await.map(|e| e.display_content),
            Some("first".to_string())
        );

        let mut second = session
            .send(OutgoingMessage::text("two"), TurnId::new("turn-2"))
            .await
            .expect("second stream");
        assert!(first.next_event().await.is_none());
        assert_eq!(first.outcome(), Some(&StreamOutcome::Cancelled));

        let events = drain(&mut second).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].display_content, "second");
        assert_eq!(
            second.outcome(),
            Some(&StreamOutcome::Completed { incomplete: false })
        );
    }

    #[tokio::test]
    async fn abort_is_idempotent_and_safe_when_idle() {
        let server = TestServer::start(vec![Reply::sse_open(&[": hello\n\n"])]).await;
        let client = A2aClient::new(ClientConfig::new(&server.endpoint)).expect("client");
        let session = client.session();
        session.abort();
        assert!(!session.is_streaming());

        let mut stream = session
            .send(OutgoingMessage::text("hi"), TurnId::new("turn-1"))
            .await
            .expect("stream");
        session.abort();
        session.abort();
        assert!(!session.is_streaming());
        assert!(stream.next_event().await.is_none());
        assert_eq!(stream.outcome(), Some(&StreamOutcome::Cancelled));
    }

    #[tokio::test]
    async fn http_error_status_fails_the_send() {
        let server = TestServer::start(vec![Reply::Status {
            status: 401,
            body: "unauthorized".into(),
        }])
        .await;
        let client = A2aClient::new(ClientConfig::new(&server.endpoint)).expect("client");
        let session = client.session();
        let err = session
            .send(OutgoingMessage::text("hi"), TurnId::new("turn-1"))
            .await
            .err()
            .expect("send should fail");
        assert!(matches!(err, ClientError::Http { status: 401, .. }));
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn silent_server_times_out_waiting_for_headers() {
        let server = TestServer::start(vec![Reply::Silent]).await;
        let client = A2aClient::new(
            ClientConfig::new(&server.endpoint).inactivity_timeout(Duration::from_millis(200)),
        )
        .expect("client");
        let session = client.session();
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            session.send(OutgoingMessage::text("hi"), TurnId::new("turn-1")),
        )
        .await
        .expect("send should not hang")
        .err()
        .expect("send should fail");
        assert!(matches!(err, ClientError::Transport(ref m) if m.contains("no response headers")));
        assert!(!session.is_streaming());
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn invalid_message_is_rejected_before_any_request() {
        let server = TestServer::start(Vec::new()).await;
        let client = A2aClient::new(ClientConfig::new(&server.endpoint)).expect("client");
        let err = client
            .session()
            .send(OutgoingMessage::default(), TurnId::new("turn-1"))
            .await
            .err()
            .expect("validation error");
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn cancel_remote_task_reports_success_as_bool() {
        let server = TestServer::start(vec![
            Reply::Json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": "1",
                "result": {"kind": "task", "id": "task-1", "status": {"state": "canceled"}}
            })),
            Reply::Json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": "2",
                "error": {"code": -32002, "message": "task cannot be canceled"}
            })),
        ])
        .await;
        let client = A2aClient::new(ClientConfig::new(&server.endpoint)).expect("client");
        let session = client.session();

        assert!(session.cancel_remote_task("task-1").await);
        assert!(!session.cancel_remote_task("task-1").await);
        let requests = server.requests();
        assert_eq!(requests[0].body["method"], "tasks/cancel");
        assert_eq!(requests[0].body["params"]["id"], "task-1");
    }
}
