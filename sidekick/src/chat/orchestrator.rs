//! Lifecycle of one outgoing prompt at a time.
//!
//! `send` creates the user entry and a streaming assistant placeholder, then
//! a driver task resolves context, runs the transport and applies its
//! updates. Every update carries the session id it was produced for and is
//! dropped if that session is no longer active, so a cancelled or replaced
//! request can never touch the message of its successor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::conversation::ConversationState;
use super::events::{ConversationEvent, EVENT_CHANNEL_CAPACITY};
use super::session::{SendTicket, SessionId, SessionOutcome, StreamPhase, StreamSession};
use super::ContextSource;
use crate::config::{ChatConfig, DeliveryMode};
use crate::error::{Error, Result};
use crate::llm::{ChatRequest, ChunkSink, LlmTransport};
use crate::models::Message;

/// Runtime knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub mode: DeliveryMode,
    pub language: String,
    /// Inactivity deadline after which a session is force-reset.
    pub watchdog: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from(&ChatConfig::default())
    }
}

impl From<&ChatConfig> for OrchestratorOptions {
    fn from(config: &ChatConfig) -> Self {
        Self {
            mode: config.mode,
            language: config.language.clone(),
            watchdog: config.watchdog(),
        }
    }
}

/// Read-only view for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSnapshot {
    /// Visible log entries in order.
    pub messages: Vec<Message>,
    /// Completed exchanges kept for the model.
    pub history: Vec<Message>,
    pub phase: StreamPhase,
    pub active_session: Option<SessionId>,
}

/// Transport output as seen by the driver.
enum StreamUpdate {
    Chunk(String),
    Finished(Result<String>),
}

struct State {
    conversation: ConversationState,
    active: Option<StreamSession>,
}

struct Inner {
    transport: Arc<dyn LlmTransport>,
    context: Option<Arc<dyn ContextSource>>,
    options: OrchestratorOptions,
    state: Mutex<State>,
    events: broadcast::Sender<ConversationEvent>,
    next_session: AtomicU64,
}

/// Owns the conversation and at most one in-flight request.
#[derive(Clone)]
pub struct StreamOrchestrator {
    inner: Arc<Inner>,
}

impl StreamOrchestrator {
    pub fn new(
        transport: Arc<dyn LlmTransport>,
        context: Option<Arc<dyn ContextSource>>,
        options: OrchestratorOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                transport,
                context,
                options,
                state: Mutex::new(State {
                    conversation: ConversationState::new(),
                    active: None,
                }),
                events,
                next_session: AtomicU64::new(1),
            }),
        }
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.inner.options
    }

    pub fn transport_name(&self) -> &'static str {
        self.inner.transport.name()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.inner.events.subscribe()
    }

    /// Start a new request for `prompt`.
    ///
    /// An active session is aborted first. The returned ticket resolves when
    /// the new session reaches a terminal state.
    pub async fn send(&self, prompt: impl Into<String>) -> Result<SendTicket> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(Error::InvalidInput("prompt is empty".to_string()));
        }

        let session_id = self.inner.next_session.fetch_add(1, Ordering::SeqCst);
        let (done_tx, done_rx) = oneshot::channel();

        let (message_id, cancel, request_history) = {
            let mut state = self.inner.state.lock().await;
            self.inner.abort_locked(&mut state, SessionOutcome::Aborted);

            let user = Message::user(prompt.clone());
            self.inner.emit(ConversationEvent::MessageAdded {
                message: state.conversation.push_log(user.clone()).clone(),
            });

            let mut placeholder = Message::assistant("");
            placeholder.streaming = true;
            let message_id = placeholder.id;
            self.inner.emit(ConversationEvent::MessageAdded {
                message: state.conversation.push_log(placeholder).clone(),
            });
            debug_assert_eq!(state.conversation.streaming_count(), 1);

            let session = StreamSession::new(session_id, message_id, user, done_tx);
            let cancel = session.cancel.clone();
            state.active = Some(session);
            self.inner.emit(ConversationEvent::PhaseChanged {
                session_id,
                phase: StreamPhase::Sending,
            });
            (message_id, cancel, state.conversation.clone())
        };

        tracing::info!(session_id, message_id = %message_id, mode = ?self.inner.options.mode, "send started");
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.drive(session_id, prompt, request_history, cancel).await;
        });

        Ok(SendTicket::new(session_id, message_id, done_rx))
    }

    /// Abort the active session, if any.
    ///
    /// Streaming is cleared immediately and accumulated text is kept. Returns
    /// `false` when there was nothing to cancel.
    pub async fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        self.inner.abort_locked(&mut state, SessionOutcome::Aborted)
    }

    /// Drop the log and history. Refused while a request is in flight.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.active.is_some() {
            return Err(Error::Busy);
        }
        state.conversation.clear();
        self.inner.emit(ConversationEvent::Cleared);
        Ok(())
    }

    /// Append a status line to the log.
    pub async fn notice(&self, text: impl Into<String>) {
        let mut state = self.inner.state.lock().await;
        let message = state.conversation.push_log(Message::notice(text)).clone();
        self.inner.emit(ConversationEvent::MessageAdded { message });
    }

    pub async fn phase(&self) -> StreamPhase {
        let state = self.inner.state.lock().await;
        state.active.as_ref().map_or(StreamPhase::Idle, |s| s.phase)
    }

    pub async fn snapshot(&self) -> ConversationSnapshot {
        let state = self.inner.state.lock().await;
        ConversationSnapshot {
            messages: state
                .conversation
                .log()
                .iter()
                .filter(|m| m.is_visible())
                .cloned()
                .collect(),
            history: state.conversation.history().to_vec(),
            phase: state.active.as_ref().map_or(StreamPhase::Idle, |s| s.phase),
            active_session: state.active.as_ref().map(|s| s.id),
        }
    }
}

impl Inner {
    fn emit(&self, event: ConversationEvent) {
        let _ = self.events.send(event);
    }

    async fn drive(
        self: Arc<Self>,
        session_id: SessionId,
        prompt: String,
        conversation: ConversationState,
        cancel: CancellationToken,
    ) {
        let language = self.options.language.clone();
        let context = match &self.context {
            Some(source) => tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                context = tokio::time::timeout(self.options.watchdog, source.context_prompt(&language)) => {
                    let Ok(context) = context else {
                        self.expire(session_id, &cancel, "context").await;
                        return;
                    };
                    context
                }
            },
            None => None,
        };
        let request = conversation.request_for(context.as_deref(), &prompt, &language);
        tracing::debug!(
            session_id,
            messages = request.messages.len(),
            has_context = context.is_some(),
            "request assembled"
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.spawn_transport(request, tx, cancel.clone());

        loop {
            match tokio::time::timeout(self.options.watchdog, rx.recv()).await {
                Ok(Some(StreamUpdate::Chunk(text))) => {
                    if !self.apply_chunk(session_id, text).await {
                        return;
                    }
                }
                Ok(Some(StreamUpdate::Finished(Ok(text)))) => {
                    self.complete(session_id, &text).await;
                    return;
                }
                Ok(Some(StreamUpdate::Finished(Err(e)))) => {
                    if e.is_cancelled() {
                        self.finish(session_id, SessionOutcome::Aborted, None).await;
                    } else {
                        self.fail(session_id, &e).await;
                    }
                    return;
                }
                Ok(None) => {
                    let e = Error::transport("transport stopped without a result");
                    self.fail(session_id, &e).await;
                    return;
                }
                Err(_) => {
                    self.expire(session_id, &cancel, "transport").await;
                    return;
                }
            }
        }
    }

    async fn expire(&self, session_id: SessionId, cancel: &CancellationToken, stage: &'static str) {
        tracing::warn!(
            session_id,
            stage,
            watchdog_ms = u64::try_from(self.options.watchdog.as_millis()).unwrap_or(u64::MAX),
            "no terminal result before watchdog deadline, resetting"
        );
        cancel.cancel();
        self.finish(session_id, SessionOutcome::WatchdogExpired, None).await;
    }

    fn spawn_transport(
        &self,
        request: ChatRequest,
        tx: mpsc::UnboundedSender<StreamUpdate>,
        cancel: CancellationToken,
    ) {
        let transport = self.transport.clone();
        match self.options.mode {
            DeliveryMode::Streaming => {
                let sink = {
                    let tx = tx.clone();
                    ChunkSink::new(move |text| {
                        let _ = tx.send(StreamUpdate::Chunk(text));
                    })
                };
                tokio::spawn(async move {
                    let result = transport.stream(&request, sink, cancel).await;
                    let _ = tx.send(StreamUpdate::Finished(result));
                });
            }
            DeliveryMode::Buffered => {
                tokio::spawn(async move {
                    let result = tokio::select! {
                        () = cancel.cancelled() => Err(Error::Cancelled),
                        result = transport.send_and_await(&request) => result,
                    };
                    let _ = tx.send(StreamUpdate::Finished(result));
                });
            }
        }
    }

    /// Returns `false` once the session is no longer active.
    async fn apply_chunk(&self, session_id: SessionId, text: String) -> bool {
        if text.is_empty() {
            return true;
        }
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(session) = state.active.as_mut().filter(|s| s.id == session_id) else {
            tracing::debug!(session_id, "dropping chunk for stale session");
            return false;
        };

        session.buffer.push_str(&text);
        if session.phase == StreamPhase::Sending {
            session.phase = StreamPhase::Streaming;
            self.emit(ConversationEvent::PhaseChanged {
                session_id,
                phase: StreamPhase::Streaming,
            });
        }
        let message_id = session.message_id;
        if let Some(message) = state.conversation.message_mut(message_id) {
            message.content.push_str(&text);
        }
        self.emit(ConversationEvent::MessageDelta {
            session_id,
            message_id,
            delta: text,
        });
        true
    }

    async fn complete(&self, session_id: SessionId, text: &str) {
        let text = normalize_escapes(text);
        self.finish(session_id, SessionOutcome::Completed, Some(text)).await;
    }

    async fn fail(&self, session_id: SessionId, error: &Error) {
        tracing::warn!(session_id, error = %error, "send failed");
        let text = format!("Error: {error}. Please try again.");
        self.finish(session_id, SessionOutcome::Errored, Some(text)).await;
    }

    /// Terminal transition. `content` replaces the message body when given.
    async fn finish(&self, session_id: SessionId, outcome: SessionOutcome, content: Option<String>) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.active.as_ref().is_none_or(|s| s.id != session_id) {
            tracing::debug!(session_id, outcome = %outcome, "ignoring terminal result for stale session");
            return;
        }
        let Some(mut session) = state.active.take() else {
            return;
        };

        let message = state.conversation.message_mut(session.message_id).map(|message| {
            message.streaming = false;
            if let Some(content) = content {
                message.content = content;
            }
            message.clone()
        });
        if let (SessionOutcome::Completed, Some(message)) = (outcome, &message) {
            let assistant = Message::assistant(message.content.clone());
            state.conversation.push_exchange(session.user_message.clone(), assistant);
        }
        self.announce_end(&mut session, outcome, message);
    }

    /// Abort the active session while the caller holds the lock.
    fn abort_locked(&self, state: &mut State, outcome: SessionOutcome) -> bool {
        let Some(mut session) = state.active.take() else {
            return false;
        };
        session.cancel.cancel();
        let message = state.conversation.message_mut(session.message_id).map(|message| {
            message.streaming = false;
            message.clone()
        });
        self.announce_end(&mut session, outcome, message);
        true
    }

    fn announce_end(&self, session: &mut StreamSession, outcome: SessionOutcome, message: Option<Message>) {
        tracing::info!(
            session_id = session.id,
            outcome = %outcome,
            elapsed_ms = u64::try_from(session.started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            received_chars = session.buffer.chars().count(),
            "session finished"
        );
        if let Some(message) = message {
            self.emit(ConversationEvent::MessageUpdated { message });
        }
        self.emit(ConversationEvent::SessionFinished {
            session_id: session.id,
            message_id: session.message_id,
            outcome,
        });
        self.emit(ConversationEvent::PhaseChanged {
            session_id: session.id,
            phase: StreamPhase::Idle,
        });
        session.resolve(outcome);
    }
}

/// Turn literal `\r\n` and `\n` escape sequences into real newlines.
fn normalize_escapes(text: &str) -> String {
    text.replace("\\r\\n", "\n").replace("\\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    enum Step {
        Chunk(&'static str),
        Wait(Arc<Notify>),
        WaitForCancel,
        Hang,
    }

    struct Script {
        steps: Vec<Step>,
        result: std::result::Result<&'static str, &'static str>,
    }

    fn script(steps: Vec<Step>, result: std::result::Result<&'static str, &'static str>) -> Script {
        Script { steps, result }
    }

    /// Plays one script per call and records every request.
    #[derive(Default)]
    struct FakeTransport {
        scripts: StdMutex<VecDeque<Script>>,
        requests: StdMutex<Vec<ChatRequest>>,
    }

    impl FakeTransport {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: StdMutex::new(scripts.into()),
                requests: StdMutex::default(),
            })
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmTransport for FakeTransport {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn stream(
            &self,
            request: &ChatRequest,
            sink: ChunkSink,
            cancel: CancellationToken,
        ) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| script(Vec::new(), Ok("")));
            for step in script.steps {
                match step {
                    Step::Chunk(text) => sink.push(text),
                    Step::Wait(gate) => gate.notified().await,
                    Step::WaitForCancel => {
                        cancel.cancelled().await;
                        return Err(Error::Cancelled);
                    }
                    Step::Hang => futures::future::pending::<()>().await,
                }
            }
            script.result.map(String::from).map_err(Error::transport)
        }

        async fn send_and_await(&self, request: &ChatRequest) -> Result<String> {
            self.stream(request, ChunkSink::discard(), CancellationToken::new()).await
        }
    }

    struct FixedContext(Option<&'static str>);

    #[async_trait]
    impl ContextSource for FixedContext {
        async fn context_prompt(&self, _language: &str) -> Option<String> {
            self.0.map(String::from)
        }
    }

    struct HangingContext;

    #[async_trait]
    impl ContextSource for HangingContext {
        async fn context_prompt(&self, _language: &str) -> Option<String> {
            futures::future::pending().await
        }
    }

    fn orchestrator(transport: Arc<FakeTransport>, options: OrchestratorOptions) -> StreamOrchestrator {
        StreamOrchestrator::new(transport, None, options)
    }

    fn streaming() -> OrchestratorOptions {
        OrchestratorOptions::default()
    }

    async fn streaming_count(orch: &StreamOrchestrator) -> usize {
        orch.inner.state.lock().await.conversation.streaming_count()
    }

    async fn message(orch: &StreamOrchestrator, id: Uuid) -> Message {
        let snapshot = orch.snapshot().await;
        snapshot.messages.into_iter().find(|m| m.id == id).unwrap()
    }

    #[tokio::test]
    async fn chunks_accumulate_into_final_text() {
        let transport = FakeTransport::new(vec![script(
            vec![Step::Chunk("Hel"), Step::Chunk("lo "), Step::Chunk("world")],
            Ok("Hello world"),
        )]);
        let orch = orchestrator(transport, streaming());

        let ticket = orch.send("greet me").await.unwrap();
        let id = ticket.message_id;
        assert_eq!(ticket.finished().await, SessionOutcome::Completed);

        let answer = message(&orch, id).await;
        assert_eq!(answer.content, "Hello world");
        assert!(!answer.streaming);

        let snapshot = orch.snapshot().await;
        assert_eq!(snapshot.phase, StreamPhase::Idle);
        let history: Vec<(MessageRole, &str)> = snapshot
            .history
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            history,
            vec![(MessageRole::User, "greet me"), (MessageRole::Assistant, "Hello world")]
        );
    }

    #[tokio::test]
    async fn events_follow_the_lifecycle() {
        let transport = FakeTransport::new(vec![script(
            vec![Step::Chunk(""), Step::Chunk("a"), Step::Chunk("b")],
            Ok("ab"),
        )]);
        let orch = orchestrator(transport, streaming());
        let mut events = orch.subscribe();

        let ticket = orch.send("x").await.unwrap();
        let session_id = ticket.session_id;
        ticket.finished().await;

        let mut deltas = Vec::new();
        let mut phases = Vec::new();
        let mut finished = None;
        while let Ok(event) = events.try_recv() {
            match event {
                ConversationEvent::MessageDelta { delta, .. } => deltas.push(delta),
                ConversationEvent::PhaseChanged { phase, .. } => phases.push(phase),
                ConversationEvent::SessionFinished { outcome, session_id: id, .. } => {
                    finished = Some((id, outcome));
                }
                _ => {}
            }
        }
        assert_eq!(deltas, vec!["a", "b"]);
        assert_eq!(
            phases,
            vec![StreamPhase::Sending, StreamPhase::Streaming, StreamPhase::Idle]
        );
        assert_eq!(finished, Some((session_id, SessionOutcome::Completed)));
    }

    #[tokio::test]
    async fn exactly_one_message_streams_during_a_send() {
        let gate = Arc::new(Notify::new());
        let transport = FakeTransport::new(vec![script(
            vec![Step::Chunk("partial"), Step::Wait(gate.clone())],
            Ok("partial"),
        )]);
        let orch = orchestrator(transport, streaming());

        let ticket = orch.send("x").await.unwrap();
        assert_eq!(streaming_count(&orch).await, 1);

        gate.notify_one();
        ticket.finished().await;
        assert_eq!(streaming_count(&orch).await, 0);
    }

    #[tokio::test]
    async fn cancel_before_first_chunk_leaves_history_unchanged() {
        let transport = FakeTransport::new(vec![
            script(vec![Step::Chunk("ok")], Ok("ok")),
            script(vec![Step::WaitForCancel], Ok("")),
        ]);
        let orch = orchestrator(transport, streaming());
        orch.send("first").await.unwrap().finished().await;
        let before = orch.snapshot().await.history;

        let ticket = orch.send("second").await.unwrap();
        let id = ticket.message_id;
        assert!(orch.cancel().await);
        assert!(!orch.cancel().await);
        assert_eq!(ticket.finished().await, SessionOutcome::Aborted);

        let snapshot = orch.snapshot().await;
        assert_eq!(snapshot.history, before);
        assert_eq!(snapshot.phase, StreamPhase::Idle);
        let placeholder = message(&orch, id).await;
        assert!(!placeholder.streaming);
        assert_eq!(placeholder.content, "");
    }

    #[tokio::test]
    async fn cancel_when_idle_is_a_no_op() {
        let orch = orchestrator(FakeTransport::new(Vec::new()), streaming());
        assert!(!orch.cancel().await);
    }

    #[tokio::test]
    async fn stale_session_updates_are_ignored() {
        let gate = Arc::new(Notify::new());
        let transport = FakeTransport::new(vec![
            script(vec![Step::Wait(gate.clone()), Step::Chunk("late")], Ok("late")),
            script(vec![Step::Chunk("fresh")], Ok("fresh")),
        ]);
        let orch = orchestrator(transport, streaming());

        let first = orch.send("one").await.unwrap();
        let first_id = first.message_id;
        // Let the first driver reach the transport before it is replaced.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = orch.send("two").await.unwrap();
        let second_id = second.message_id;
        assert_eq!(first.finished().await, SessionOutcome::Aborted);
        assert_eq!(second.finished().await, SessionOutcome::Completed);

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(message(&orch, first_id).await.content, "");
        assert_eq!(message(&orch, second_id).await.content, "fresh");
        let history: Vec<String> = orch
            .snapshot()
            .await
            .history
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(history, vec!["two", "fresh"]);
    }

    #[tokio::test]
    async fn transport_error_becomes_inline_message() {
        let transport = FakeTransport::new(vec![script(vec![Step::Chunk("par")], Err("boom"))]);
        let orch = orchestrator(transport, streaming());

        let ticket = orch.send("x").await.unwrap();
        let id = ticket.message_id;
        assert_eq!(ticket.finished().await, SessionOutcome::Errored);

        let reply = message(&orch, id).await;
        assert_eq!(reply.content, "Error: transport error: boom. Please try again.");
        assert!(!reply.streaming);
        assert!(orch.snapshot().await.history.is_empty());
    }

    #[tokio::test]
    async fn watchdog_resets_a_silent_session() {
        let transport = FakeTransport::new(vec![script(vec![Step::Chunk("par"), Step::Hang], Ok(""))]);
        let options = OrchestratorOptions {
            watchdog: Duration::from_millis(100),
            ..streaming()
        };
        let orch = orchestrator(transport, options);

        let ticket = orch.send("x").await.unwrap();
        let id = ticket.message_id;
        assert_eq!(ticket.finished().await, SessionOutcome::WatchdogExpired);

        let reply = message(&orch, id).await;
        assert_eq!(reply.content, "par");
        assert!(!reply.streaming);
        assert_eq!(orch.phase().await, StreamPhase::Idle);
        assert!(orch.snapshot().await.history.is_empty());
    }

    #[tokio::test]
    async fn watchdog_covers_a_stuck_context_lookup() {
        let transport = FakeTransport::new(vec![script(vec![Step::Chunk("never")], Ok("never"))]);
        let options = OrchestratorOptions {
            watchdog: Duration::from_millis(100),
            ..streaming()
        };
        let orch = StreamOrchestrator::new(transport.clone(), Some(Arc::new(HangingContext)), options);

        let ticket = orch.send("x").await.unwrap();
        let id = ticket.message_id;
        let outcome = tokio::time::timeout(Duration::from_secs(2), ticket.finished())
            .await
            .unwrap();
        assert_eq!(outcome, SessionOutcome::WatchdogExpired);

        assert_eq!(orch.phase().await, StreamPhase::Idle);
        assert_eq!(streaming_count(&orch).await, 0);
        assert_eq!(message(&orch, id).await.content, "");
        assert!(transport.requests().is_empty());
        assert!(orch.snapshot().await.history.is_empty());
    }

    #[tokio::test]
    async fn buffered_mode_replaces_placeholder_at_once() {
        let transport = FakeTransport::new(vec![script(
            vec![Step::Chunk("ignored")],
            Ok("Hello\\nworld"),
        )]);
        let options = OrchestratorOptions {
            mode: DeliveryMode::Buffered,
            ..streaming()
        };
        let orch = orchestrator(transport, options);
        let mut events = orch.subscribe();

        let ticket = orch.send("x").await.unwrap();
        let id = ticket.message_id;
        assert_eq!(ticket.finished().await, SessionOutcome::Completed);

        assert_eq!(message(&orch, id).await.content, "Hello\nworld");
        let history = orch.snapshot().await.history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Hello\nworld");
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, ConversationEvent::MessageDelta { .. }));
        }
    }

    #[tokio::test]
    async fn context_is_prepended_fresh_on_every_send() {
        let transport = FakeTransport::new(vec![
            script(vec![Step::Chunk("a1")], Ok("a1")),
            script(vec![Step::Chunk("a2")], Ok("a2")),
        ]);
        let orch = StreamOrchestrator::new(
            transport.clone(),
            Some(Arc::new(FixedContext(Some("CTX")))),
            streaming(),
        );

        orch.send("q1").await.unwrap().finished().await;
        orch.send("q2").await.unwrap().finished().await;

        let requests = transport.requests();
        let second: Vec<(MessageRole, &str)> = requests[1]
            .messages
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            second,
            vec![
                (MessageRole::System, "CTX"),
                (MessageRole::User, "q1"),
                (MessageRole::Assistant, "a1"),
                (MessageRole::User, "q2"),
            ]
        );
        assert!(orch.snapshot().await.messages.iter().all(|m| m.role != MessageRole::System));
    }

    #[tokio::test]
    async fn missing_context_sends_history_only() {
        let transport = FakeTransport::new(vec![script(Vec::new(), Ok("a"))]);
        let orch = StreamOrchestrator::new(transport.clone(), Some(Arc::new(FixedContext(None))), streaming());

        orch.send("q").await.unwrap().finished().await;
        let request = &transport.requests()[0];
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn clear_is_refused_while_busy() {
        let transport = FakeTransport::new(vec![script(vec![Step::WaitForCancel], Ok(""))]);
        let orch = orchestrator(transport, streaming());

        orch.send("x").await.unwrap();
        assert!(matches!(orch.clear().await, Err(Error::Busy)));
        orch.cancel().await;
        orch.clear().await.unwrap();
        assert!(orch.snapshot().await.messages.is_empty());
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected() {
        let orch = orchestrator(FakeTransport::new(Vec::new()), streaming());
        assert!(matches!(orch.send("  ").await, Err(Error::InvalidInput(_))));
        assert!(orch.snapshot().await.messages.is_empty());
    }

    #[test]
    fn escape_sequences_are_normalized() {
        assert_eq!(normalize_escapes("a\\r\\nb\\nc"), "a\nb\nc");
        assert_eq!(normalize_escapes("plain\ntext"), "plain\ntext");
    }
}
