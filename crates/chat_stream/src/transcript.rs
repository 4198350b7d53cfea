use serde::{Deserialize, Serialize};

/// Author of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One message in a conversation.
///
/// `content` grows monotonically while a stream is open and is immutable
/// afterwards. `reasoning` is only ever attached when the owning turn is
/// closed, never mid-stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl ChatTurn {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            reasoning: None,
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>, reasoning: Option<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            reasoning,
        }
    }
}

/// Ordered sequence of turns for one conversation.
///
/// At most one turn is open (mutable) at a time; its index is fixed when
/// the owning session starts and survives wholesale replacement of the
/// backing vector.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
    open_turn: Option<usize>,
    conversation_id: Option<String>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Returns true while an assistant turn is open for streaming.
    #[must_use]
    pub fn has_open_turn(&self) -> bool {
        self.open_turn.is_some()
    }

    /// Appends a completed user turn and returns its index.
    pub fn push_user(&mut self, content: impl Into<String>) -> usize {
        self.turns.push(ChatTurn::user(content));
        self.turns.len() - 1
    }

    /// Opens an empty assistant turn for streaming.
    ///
    /// Returns `None` when another turn is already open; the transcript is
    /// left untouched in that case.
    pub fn open_assistant_turn(&mut self) -> Option<usize> {
        if self.open_turn.is_some() {
            return None;
        }
        self.turns.push(ChatTurn::assistant(String::new(), None));
        let index = self.turns.len() - 1;
        self.open_turn = Some(index);
        Some(index)
    }

    /// Appends a content delta to the open turn at `index`.
    ///
    /// Silently ignores writes against a turn that is not the open one;
    /// closed turns are immutable.
    pub fn append_content(&mut self, index: usize, delta: &str) {
        if self.open_turn != Some(index) {
            return;
        }
        if let Some(turn) = self.turns.get_mut(index) {
            turn.content.push_str(delta);
        }
    }

    /// Closes the open turn at `index`, attaching the reasoning trace.
    pub fn close_turn(&mut self, index: usize, reasoning: Option<String>) {
        if self.open_turn != Some(index) {
            return;
        }
        if let Some(turn) = self.turns.get_mut(index) {
            turn.reasoning = reasoning.filter(|trace| !trace.is_empty());
        }
        self.open_turn = None;
    }

    /// Records the backend-reported conversation identifier.
    ///
    /// The first label wins: repeats of the same id are no-ops and a
    /// conflicting id is ignored. Returns true when the label was applied.
    pub fn label_conversation(&mut self, conversation_id: impl Into<String>) -> bool {
        if self.conversation_id.is_some() {
            return false;
        }
        self.conversation_id = Some(conversation_id.into());
        true
    }

    /// Replaces the transcript wholesale with a loaded conversation.
    pub fn replace_with(&mut self, turns: Vec<ChatTurn>, conversation_id: Option<String>) {
        self.turns = turns;
        self.open_turn = None;
        self.conversation_id = conversation_id;
    }

    /// Resets to an empty conversation.
    pub fn clear(&mut self) {
        self.replace_with(Vec::new(), None);
    }
}
