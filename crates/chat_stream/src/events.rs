/// Stream event emitted by the parser after normalization.
///
/// Channel discriminators mirror the backend's wire tags. Anything the
/// parser does not recognize is dropped before it reaches this enum, so
/// consumers never see an "unknown" variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatStreamEvent {
    /// Incremental fragment of the assistant's visible reply.
    Content { delta: String },
    /// Incremental fragment of the auxiliary reasoning channel.
    Reasoning { delta: String },
    /// Conversation identifier under which the backend persisted this chat.
    Meta { conversation_id: String },
    /// Explicit successful end of stream.
    Done,
    /// Explicit failed end of stream.
    Error { message: Option<String> },
}

impl ChatStreamEvent {
    /// Returns true when this event ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}
