use serde_json::Value;

use crate::events::ChatStreamEvent;

/// Incremental parser for newline-delimited JSON event streams.
#[derive(Debug, Default)]
pub struct NdjsonStreamParser {
    buffer: String,
}

impl NdjsonStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ChatStreamEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut events = Vec::new();

        while let Some(split) = self.buffer.find('\n') {
            let line = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 1);

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Ok(value) = serde_json::from_str::<Value>(line) {
                if let Some(event) = map_event(value) {
                    events.push(event);
                }
            }
        }

        events
    }

    /// Parse a complete payload string in one shot.
    pub fn parse_lines(input: &str) -> Vec<ChatStreamEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

fn map_event(value: Value) -> Option<ChatStreamEvent> {
    let event_type = value.get("type")?.as_str()?;

    match event_type {
        "content" => {
            let delta = value
                .get("delta")
                .and_then(|value| value.as_str())
                .unwrap_or("");
            Some(ChatStreamEvent::Content {
                delta: delta.to_owned(),
            })
        }
        "reasoning" => {
            let delta = value
                .get("delta")
                .and_then(|value| value.as_str())
                .unwrap_or("");
            Some(ChatStreamEvent::Reasoning {
                delta: delta.to_owned(),
            })
        }
        "meta" => {
            let conversation_id = conversation_id_string(value.get("chat_id")?)?;
            Some(ChatStreamEvent::Meta { conversation_id })
        }
        "done" => Some(ChatStreamEvent::Done),
        "error" => {
            let message = value
                .get("message")
                .and_then(|value| value.as_str())
                .map(ToString::to_string);
            Some(ChatStreamEvent::Error { message })
        }
        _ => None,
    }
}

// The backend reports sqlite row ids as numbers; older builds sent strings.
fn conversation_id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::NdjsonStreamParser;
    use crate::events::ChatStreamEvent;

    #[test]
    fn parse_lines_incrementally_across_chunk_boundaries() {
        let mut parser = NdjsonStreamParser::default();
        let mut events = Vec::new();

        events.extend(parser.feed(b"{\"type\":\"content\",\"del"));
        assert!(events.is_empty());

        events.extend(parser.feed(b"ta\":\"Hel\"}\n{\"type\":\"content\",\"delta\":\"lo\"}\n"));
        assert_eq!(
            events,
            vec![
                ChatStreamEvent::Content {
                    delta: "Hel".to_string(),
                },
                ChatStreamEvent::Content {
                    delta: "lo".to_string(),
                },
            ]
        );
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn meta_accepts_numeric_and_string_chat_ids() {
        let events =
            NdjsonStreamParser::parse_lines("{\"type\":\"meta\",\"chat_id\":7}\n{\"type\":\"meta\",\"chat_id\":\"abc\"}\n");

        assert_eq!(
            events,
            vec![
                ChatStreamEvent::Meta {
                    conversation_id: "7".to_string(),
                },
                ChatStreamEvent::Meta {
                    conversation_id: "abc".to_string(),
                },
            ]
        );
    }

    #[test]
    fn unrecognized_event_tags_are_dropped_without_error() {
        let events = NdjsonStreamParser::parse_lines(
            "{\"type\":\"event\",\"data\":{\"choices\":[]}}\n{\"type\":\"usage\",\"tokens\":12}\n{\"type\":\"done\"}\n",
        );

        assert_eq!(events, vec![ChatStreamEvent::Done]);
    }

    #[test]
    fn malformed_lines_and_blank_lines_are_skipped() {
        let events = NdjsonStreamParser::parse_lines(
            "not json at all\n\n{\"type\":\"content\",\"delta\":\"ok\"}\n",
        );

        assert_eq!(
            events,
            vec![ChatStreamEvent::Content {
                delta: "ok".to_string(),
            }]
        );
    }

    #[test]
    fn terminal_error_event_carries_optional_message() {
        let events = NdjsonStreamParser::parse_lines(
            "{\"type\":\"error\",\"message\":\"model unavailable\"}\n{\"type\":\"error\"}\n",
        );

        assert_eq!(
            events,
            vec![
                ChatStreamEvent::Error {
                    message: Some("model unavailable".to_string()),
                },
                ChatStreamEvent::Error { message: None },
            ]
        );
    }
}
