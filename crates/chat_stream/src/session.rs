use std::fmt;

use crate::events::ChatStreamEvent;
use crate::transcript::Transcript;

/// Lifecycle of one streamed assistant response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Completed,
    Cancelled,
    Failed,
}

/// Terminal disposition of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Cancelled,
    Failed { reason: String },
}

impl SessionOutcome {
    fn state(&self) -> SessionState {
        match self {
            Self::Completed => SessionState::Completed,
            Self::Cancelled => SessionState::Cancelled,
            Self::Failed { .. } => SessionState::Failed,
        }
    }
}

/// Error starting a session against a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Another session's assistant turn is still open.
    AlreadyActive,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyActive => {
                write!(f, "a streaming session is already active for this transcript")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Client-side state machine for one streamed chat turn.
///
/// The session is the sole writer of its designated assistant turn.
/// Content deltas are applied in arrival order; reasoning deltas are held
/// in a session-local buffer that only reaches the transcript when the
/// session terminates (success, cancellation, or failure). Events arriving
/// after a terminal transition are dropped.
#[derive(Debug)]
pub struct StreamSession {
    turn_index: usize,
    state: SessionState,
    reasoning: String,
    content_seen: bool,
    meta_applied: bool,
}

impl StreamSession {
    /// Opens an assistant turn and binds this session to it.
    ///
    /// Fails without mutating the transcript when another session is
    /// active.
    pub fn begin(transcript: &mut Transcript) -> Result<Self, SessionError> {
        let turn_index = transcript
            .open_assistant_turn()
            .ok_or(SessionError::AlreadyActive)?;
        Ok(Self {
            turn_index,
            state: SessionState::Active,
            reasoning: String::new(),
            content_seen: false,
            meta_applied: false,
        })
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn turn_index(&self) -> usize {
        self.turn_index
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state != SessionState::Active
    }

    /// Returns true once at least one content delta has been applied.
    ///
    /// Callers use this to distinguish a failure before the first content
    /// byte (empty turn) from a failure that truncated a partial reply.
    #[must_use]
    pub fn content_seen(&self) -> bool {
        self.content_seen
    }

    /// Live view of the accumulating reasoning buffer.
    ///
    /// This is a side-channel value for observers; it is not transcript
    /// state until the session terminates.
    #[must_use]
    pub fn reasoning_buffer(&self) -> &str {
        &self.reasoning
    }

    /// Applies one wire event. Returns false when the event was dropped
    /// (session already terminal).
    pub fn apply(&mut self, transcript: &mut Transcript, event: ChatStreamEvent) -> bool {
        if self.is_terminal() {
            return false;
        }

        match event {
            ChatStreamEvent::Content { delta } => {
                if !delta.is_empty() {
                    self.content_seen = true;
                    transcript.append_content(self.turn_index, &delta);
                }
            }
            ChatStreamEvent::Reasoning { delta } => {
                self.reasoning.push_str(&delta);
            }
            ChatStreamEvent::Meta { conversation_id } => {
                if !self.meta_applied {
                    transcript.label_conversation(conversation_id);
                    self.meta_applied = true;
                }
            }
            ChatStreamEvent::Done => {
                self.finish(transcript, SessionOutcome::Completed);
            }
            ChatStreamEvent::Error { message } => {
                let reason =
                    message.unwrap_or_else(|| "backend reported an error".to_string());
                self.finish(transcript, SessionOutcome::Failed { reason });
            }
        }

        true
    }

    /// Terminates the session, closing the turn and flushing the reasoning
    /// buffer onto it. Partial content is always retained. Idempotent: the
    /// first terminal transition wins.
    pub fn finish(&mut self, transcript: &mut Transcript, outcome: SessionOutcome) {
        if self.is_terminal() {
            return;
        }
        self.state = outcome.state();
        let reasoning = std::mem::take(&mut self.reasoning);
        let reasoning = if reasoning.is_empty() {
            None
        } else {
            Some(reasoning)
        };
        transcript.close_turn(self.turn_index, reasoning);
    }
}
