use chat_stream::{ChatTurn, TurnRole};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderRecordType {
    Conversation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRecordType {
    Turn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationHeader {
    #[serde(rename = "type")]
    pub record_type: HeaderRecordType,
    pub version: u32,
    pub conversation_id: String,
    pub created_at: String,
    pub title: String,
}

impl ConversationHeader {
    #[must_use]
    pub fn v1(
        conversation_id: impl Into<String>,
        created_at: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            record_type: HeaderRecordType::Conversation,
            version: 1,
            conversation_id: conversation_id.into(),
            created_at: created_at.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoredTurn {
    #[serde(rename = "type")]
    pub record_type: TurnRecordType,
    pub role: TurnRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub ts: String,
}

impl StoredTurn {
    #[must_use]
    pub fn from_turn(turn: &ChatTurn, ts: impl Into<String>) -> Self {
        Self {
            record_type: TurnRecordType::Turn,
            role: turn.role,
            content: turn.content.clone(),
            reasoning: turn.reasoning.clone(),
            ts: ts.into(),
        }
    }

    #[must_use]
    pub fn into_turn(self) -> ChatTurn {
        ChatTurn {
            role: self.role,
            content: self.content,
            reasoning: self.reasoning,
        }
    }
}

/// One line of a conversation file, either shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum JsonLine {
    Header(ConversationHeader),
    Turn(StoredTurn),
}
