use serde::{Deserialize, Serialize};

/// One history entry sent to the streaming endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Canonical request payload shape for the streaming chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            chat_id: None,
        }
    }

    #[must_use]
    pub fn with_conversation(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatMessage, ChatRequest};

    #[test]
    fn absent_chat_id_is_omitted_from_serialization() {
        let request = ChatRequest::new("gpt-oss-20b", vec![ChatMessage::user("hi")]);
        let json = serde_json::to_value(&request).expect("request should serialize");

        assert!(json.get("chat_id").is_none());
        assert_eq!(json["model"], "gpt-oss-20b");
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn conversation_id_round_trips() {
        let request =
            ChatRequest::new("gpt-oss-20b", Vec::new()).with_conversation("17");
        let json = serde_json::to_string(&request).expect("request should serialize");
        let back: ChatRequest = serde_json::from_str(&json).expect("request should parse");

        assert_eq!(back.chat_id.as_deref(), Some("17"));
    }
}
