//! Chat controller: the single writer that coordinates transcript,
//! streaming sessions, and persistence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use chat_store::{ChatStore, ConversationSummary, StoredConversation};
use chat_stream::{
    CancellationSignal, ChatApiError, ChatMessage, ChatRequest, ChatStreamEvent, ChatTurn,
    SessionOutcome, StreamSession, Transcript, TurnRole,
};

use crate::transport::StreamTransport;

/// Observer-facing progress report for the active turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    ContentDelta { text: String },
    ReasoningDelta { text: String },
    ConversationLabeled { conversation_id: String },
    Finished { outcome: SessionOutcome },
}

struct ActiveTurn {
    cancel: CancellationSignal,
    join_handle: Option<JoinHandle<()>>,
}

/// Owns one conversation's state on behalf of the UI.
///
/// Exactly one turn streams at a time: `send` gates on the active turn and
/// the transcript's open-turn invariant, runs the transport on a named
/// worker thread, and reports progress over the update channel.
pub struct ChatController {
    transport: Arc<dyn StreamTransport>,
    transcript: Mutex<Transcript>,
    session: Mutex<Option<StreamSession>>,
    active: Mutex<Option<ActiveTurn>>,
    store: Option<ChatStore>,
    record: Mutex<Option<StoredConversation>>,
    model: String,
    updates: Sender<SessionUpdate>,
}

impl ChatController {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        store: Option<ChatStore>,
        model: impl Into<String>,
    ) -> (Arc<Self>, Receiver<SessionUpdate>) {
        let (updates, receiver) = mpsc::channel();
        let controller = Arc::new(Self {
            transport,
            transcript: Mutex::new(Transcript::new()),
            session: Mutex::new(None),
            active: Mutex::new(None),
            store,
            record: Mutex::new(None),
            model: model.into(),
            updates,
        });
        (controller, receiver)
    }

    /// Sends one user message, streaming the reply into the transcript.
    pub fn send(self: &Arc<Self>, text: &str) -> Result<(), String> {
        let mut active = lock_unpoisoned(&self.active);
        if active.is_some() {
            return Err("A turn is already streaming".to_string());
        }

        let (request, session) = {
            let mut transcript = lock_unpoisoned(&self.transcript);
            if transcript.has_open_turn() {
                return Err("A turn is already streaming".to_string());
            }
            transcript.push_user(text);
            let messages = wire_history(&transcript);
            let session = StreamSession::begin(&mut transcript)
                .map_err(|error| error.to_string())?;

            let mut request = ChatRequest::new(self.model.clone(), messages);
            if let Some(conversation_id) = transcript.conversation_id() {
                request = request.with_conversation(conversation_id);
            }
            (request, session)
        };
        *lock_unpoisoned(&self.session) = Some(session);

        let cancel: CancellationSignal = Arc::new(AtomicBool::new(false));
        let controller = Arc::clone(self);
        let worker_cancel = Arc::clone(&cancel);
        let join_handle = thread::Builder::new()
            .name("chat-stream-turn".to_string())
            .spawn(move || controller.run_turn(request, worker_cancel))
            .map_err(|error| format!("Failed to spawn stream worker: {error}"))?;

        *active = Some(ActiveTurn {
            cancel,
            join_handle: Some(join_handle),
        });
        Ok(())
    }

    /// Requests cooperative cancellation of the active turn, if any.
    /// Signalling an already-finished turn is a no-op.
    pub fn cancel(&self) {
        let active = lock_unpoisoned(&self.active);
        if let Some(turn) = active.as_ref() {
            turn.cancel.store(true, Ordering::SeqCst);
        }
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        lock_unpoisoned(&self.active).is_some()
    }

    /// Resets to an empty conversation.
    pub fn new_conversation(&self) -> Result<(), String> {
        self.ensure_idle()?;
        lock_unpoisoned(&self.transcript).clear();
        *lock_unpoisoned(&self.record) = None;
        Ok(())
    }

    /// Replaces the transcript wholesale with a stored conversation.
    pub fn load_conversation(&self, conversation_id: &str) -> Result<(), String> {
        self.ensure_idle()?;
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| "No conversation store configured".to_string())?;
        let stored = store
            .open(conversation_id)
            .map_err(|error| error.to_string())?;

        let label = stored.conversation_id().to_string();
        let turns = {
            let mut transcript = lock_unpoisoned(&self.transcript);
            transcript.replace_with(stored.turns().to_vec(), Some(label));
            transcript.turns().len()
        };
        *lock_unpoisoned(&self.record) = Some(stored);
        log::debug!("loaded conversation {conversation_id} with {turns} turns");
        Ok(())
    }

    pub fn list_conversations(&self) -> Result<Vec<ConversationSummary>, String> {
        match &self.store {
            Some(store) => store.list().map_err(|error| error.to_string()),
            None => Ok(Vec::new()),
        }
    }

    pub fn delete_conversation(&self, conversation_id: &str) -> Result<(), String> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| "No conversation store configured".to_string())?;
        store
            .delete(conversation_id)
            .map_err(|error| error.to_string())
    }

    /// Copy of the current transcript for rendering.
    #[must_use]
    pub fn transcript_snapshot(&self) -> Vec<ChatTurn> {
        lock_unpoisoned(&self.transcript).turns().to_vec()
    }

    #[must_use]
    pub fn conversation_id(&self) -> Option<String> {
        lock_unpoisoned(&self.transcript)
            .conversation_id()
            .map(ToString::to_string)
    }

    fn ensure_idle(&self) -> Result<(), String> {
        if self.is_streaming() {
            return Err("A turn is already streaming".to_string());
        }
        Ok(())
    }

    fn run_turn(self: Arc<Self>, request: ChatRequest, cancel: CancellationSignal) {
        let result = self.transport.stream(&request, &cancel, &mut |event| {
            self.apply_event(&cancel, event);
        });

        let outcome = match result {
            Ok(()) => SessionOutcome::Completed,
            Err(ChatApiError::Cancelled) => SessionOutcome::Cancelled,
            Err(error) => SessionOutcome::Failed {
                reason: error.to_string(),
            },
        };
        self.finish_turn(outcome);
    }

    fn apply_event(&self, cancel: &CancellationSignal, event: ChatStreamEvent) {
        // Events buffered behind an abort signal are dropped, matching the
        // transport-level cancellation semantics.
        if cancel.load(Ordering::Acquire) {
            return;
        }

        let update = match &event {
            ChatStreamEvent::Content { delta } => Some(SessionUpdate::ContentDelta {
                text: delta.clone(),
            }),
            ChatStreamEvent::Reasoning { delta } => Some(SessionUpdate::ReasoningDelta {
                text: delta.clone(),
            }),
            ChatStreamEvent::Meta { conversation_id } => {
                Some(SessionUpdate::ConversationLabeled {
                    conversation_id: conversation_id.clone(),
                })
            }
            ChatStreamEvent::Done | ChatStreamEvent::Error { .. } => None,
        };

        let applied = {
            let mut transcript = lock_unpoisoned(&self.transcript);
            let mut session = lock_unpoisoned(&self.session);
            match session.as_mut() {
                Some(session) => session.apply(&mut transcript, event),
                None => false,
            }
        };

        if applied {
            if let Some(update) = update {
                let _ = self.updates.send(update);
            }
        }
    }

    fn finish_turn(&self, outcome: SessionOutcome) {
        {
            let mut transcript = lock_unpoisoned(&self.transcript);
            let mut session = lock_unpoisoned(&self.session);
            if let Some(session) = session.as_mut() {
                session.finish(&mut transcript, outcome.clone());
            }
            *session = None;
            self.persist_exchange(&transcript);
        }

        {
            let mut active = lock_unpoisoned(&self.active);
            if let Some(mut turn) = active.take() {
                if let Some(join_handle) = turn.join_handle.take() {
                    let is_current_thread =
                        join_handle.thread().id() == thread::current().id();
                    if !is_current_thread && join_handle.is_finished() {
                        let _ = join_handle.join();
                    }
                }
            }
        }

        let _ = self.updates.send(SessionUpdate::Finished { outcome });
    }

    // Persists the latest user/assistant exchange. Failures are logged,
    // not surfaced: a missed save must not take down the session host.
    fn persist_exchange(&self, transcript: &Transcript) {
        let Some(store) = &self.store else {
            return;
        };

        let turns = transcript.turns();
        let count = turns.len();
        if count < 2 {
            return;
        }
        let user = &turns[count - 2];
        let assistant = &turns[count - 1];
        if user.role != TurnRole::User || assistant.role != TurnRole::Assistant {
            return;
        }

        let mut record = lock_unpoisoned(&self.record);
        if record.is_none() {
            match store.create(&user.content) {
                Ok(created) => *record = Some(created),
                Err(error) => {
                    log::warn!("failed to create conversation record: {error}");
                    return;
                }
            }
        }
        let Some(record) = record.as_mut() else {
            return;
        };

        if let Err(error) = record.append_turn(user) {
            log::warn!("failed to persist user turn: {error}");
            return;
        }
        if !assistant.content.is_empty() {
            if let Err(error) = record.append_turn(assistant) {
                log::warn!("failed to persist assistant turn: {error}");
            }
        }
    }
}

/// Builds the wire-facing history from completed transcript turns.
///
/// The open assistant turn (empty, still streaming) never appears; failed
/// turns that kept partial content do, matching what the user sees.
fn wire_history(transcript: &Transcript) -> Vec<ChatMessage> {
    transcript
        .turns()
        .iter()
        .filter(|turn| !turn.content.is_empty())
        .map(|turn| match turn.role {
            TurnRole::User => ChatMessage::user(&turn.content),
            TurnRole::Assistant => ChatMessage::assistant(&turn.content),
        })
        .collect()
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::mpsc::Receiver;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chat_store::ChatStore;
    use chat_stream::{
        CancellationSignal, ChatApiError, ChatRequest, ChatStreamEvent, ChatTurn,
        SessionOutcome, TurnRole,
    };

    use super::{ChatController, SessionUpdate};
    use crate::transport::StreamTransport;

    enum FakeEnd {
        Complete,
        Cancelled,
        Fail(String),
    }

    struct FakeTransport {
        events: Vec<ChatStreamEvent>,
        end: FakeEnd,
        /// When true, spin after the scripted events until cancellation is
        /// signalled, then emit one more late delta before returning.
        wait_for_cancel: bool,
        observed_requests: Mutex<Vec<ChatRequest>>,
    }

    impl FakeTransport {
        fn completing(events: Vec<ChatStreamEvent>) -> Arc<Self> {
            Arc::new(Self {
                events,
                end: FakeEnd::Complete,
                wait_for_cancel: false,
                observed_requests: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                events: Vec::new(),
                end: FakeEnd::Fail(message.to_string()),
                wait_for_cancel: false,
                observed_requests: Mutex::new(Vec::new()),
            })
        }

        fn cancellable(events: Vec<ChatStreamEvent>) -> Arc<Self> {
            Arc::new(Self {
                events,
                end: FakeEnd::Cancelled,
                wait_for_cancel: true,
                observed_requests: Mutex::new(Vec::new()),
            })
        }
    }

    impl StreamTransport for FakeTransport {
        fn stream(
            &self,
            request: &ChatRequest,
            cancel: &CancellationSignal,
            on_event: &mut dyn FnMut(ChatStreamEvent),
        ) -> Result<(), ChatApiError> {
            self.observed_requests
                .lock()
                .expect("request log lock poisoned")
                .push(request.clone());

            for event in &self.events {
                on_event(event.clone());
            }

            if self.wait_for_cancel {
                while !cancel.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_millis(5));
                }
                // A delta that was already in flight when the abort landed.
                on_event(ChatStreamEvent::Content {
                    delta: "al".to_string(),
                });
            }

            match &self.end {
                FakeEnd::Complete => Ok(()),
                FakeEnd::Cancelled => Err(ChatApiError::Cancelled),
                FakeEnd::Fail(message) => Err(ChatApiError::StreamFailed {
                    message: message.clone(),
                }),
            }
        }
    }

    fn wait_for_finish(updates: &Receiver<SessionUpdate>) -> SessionOutcome {
        loop {
            match updates
                .recv_timeout(Duration::from_secs(5))
                .expect("worker should report progress")
            {
                SessionUpdate::Finished { outcome } => return outcome,
                _ => continue,
            }
        }
    }

    fn content(delta: &str) -> ChatStreamEvent {
        ChatStreamEvent::Content {
            delta: delta.to_string(),
        }
    }

    #[test]
    fn send_streams_content_into_the_transcript() {
        let transport = FakeTransport::completing(vec![
            ChatStreamEvent::Meta {
                conversation_id: "7".to_string(),
            },
            content("Hel"),
            content("lo"),
            content(" world"),
            ChatStreamEvent::Done,
        ]);
        let (controller, updates) =
            ChatController::new(transport.clone(), None, "gpt-oss-20b");

        controller.send("greet me").expect("send should start");
        let outcome = wait_for_finish(&updates);

        assert_eq!(outcome, SessionOutcome::Completed);
        let turns = controller.transcript_snapshot();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[1].content, "Hello world");
        assert_eq!(controller.conversation_id().as_deref(), Some("7"));

        let requests = transport
            .observed_requests
            .lock()
            .expect("request log lock poisoned");
        assert_eq!(requests[0].model, "gpt-oss-20b");
        assert_eq!(requests[0].messages.len(), 1);
    }

    #[test]
    fn second_send_while_streaming_is_rejected() {
        let transport = FakeTransport::cancellable(vec![content("Par")]);
        let (controller, updates) = ChatController::new(transport, None, "gpt-oss-20b");

        controller.send("first").expect("send should start");
        let error = controller
            .send("second")
            .expect_err("second send must be rejected");
        assert!(error.contains("already streaming"));

        controller.cancel();
        wait_for_finish(&updates);
    }

    #[test]
    fn cancellation_keeps_partial_content_and_drops_late_deltas() {
        let transport = FakeTransport::cancellable(vec![content("Par"), content("ti")]);
        let (controller, updates) = ChatController::new(transport, None, "gpt-oss-20b");

        controller.send("partial please").expect("send should start");
        // Let the scripted deltas land before aborting.
        std::thread::sleep(Duration::from_millis(50));
        controller.cancel();
        let outcome = wait_for_finish(&updates);

        assert_eq!(outcome, SessionOutcome::Cancelled);
        let turns = controller.transcript_snapshot();
        assert_eq!(turns[1].content, "Parti");
        assert!(!controller.is_streaming());
    }

    #[test]
    fn transport_failure_before_content_leaves_an_empty_turn() {
        let transport = FakeTransport::failing("connection refused");
        let (controller, updates) = ChatController::new(transport, None, "gpt-oss-20b");

        controller.send("hello?").expect("send should start");
        let outcome = wait_for_finish(&updates);

        assert!(matches!(outcome, SessionOutcome::Failed { .. }));
        let turns = controller.transcript_snapshot();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "");
    }

    #[test]
    fn a_new_turn_is_possible_after_the_previous_finishes() {
        let transport =
            FakeTransport::completing(vec![content("ok"), ChatStreamEvent::Done]);
        let (controller, updates) = ChatController::new(transport, None, "gpt-oss-20b");

        controller.send("one").expect("first send should start");
        wait_for_finish(&updates);
        controller.send("two").expect("second send should start");
        wait_for_finish(&updates);

        assert_eq!(controller.transcript_snapshot().len(), 4);
    }

    #[test]
    fn completed_exchanges_are_persisted_to_the_store() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let transport =
            FakeTransport::completing(vec![content("hi there"), ChatStreamEvent::Done]);
        let (controller, updates) = ChatController::new(
            transport,
            Some(ChatStore::new(dir.path())),
            "gpt-oss-20b",
        );

        controller.send("hello").expect("send should start");
        wait_for_finish(&updates);

        let listed = controller
            .list_conversations()
            .expect("store should list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "hello");
    }

    #[test]
    fn load_conversation_replaces_the_transcript_wholesale() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let store = ChatStore::new(dir.path());
        let mut stored = store.create("older chat").expect("conversation should create");
        stored
            .append_turn(&ChatTurn::user("older chat"))
            .expect("turn should append");
        stored
            .append_turn(&ChatTurn::assistant("archived reply", None))
            .expect("turn should append");
        let stored_id = stored.conversation_id().to_string();
        drop(stored);

        let transport =
            FakeTransport::completing(vec![content("live"), ChatStreamEvent::Done]);
        let (controller, updates) =
            ChatController::new(transport, Some(store), "gpt-oss-20b");

        controller.send("live message").expect("send should start");
        wait_for_finish(&updates);

        controller
            .load_conversation(&stored_id)
            .expect("stored conversation should load");

        let turns = controller.transcript_snapshot();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "archived reply");
        assert_eq!(controller.conversation_id().as_deref(), Some(stored_id.as_str()));
    }

    #[test]
    fn new_conversation_clears_transcript_and_label() {
        let transport = FakeTransport::completing(vec![
            ChatStreamEvent::Meta {
                conversation_id: "5".to_string(),
            },
            content("hi"),
            ChatStreamEvent::Done,
        ]);
        let (controller, updates) = ChatController::new(transport, None, "gpt-oss-20b");

        controller.send("hello").expect("send should start");
        wait_for_finish(&updates);
        controller
            .new_conversation()
            .expect("reset should succeed");

        assert!(controller.transcript_snapshot().is_empty());
        assert_eq!(controller.conversation_id(), None);
    }
}
