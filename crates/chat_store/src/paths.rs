/// Longest title the store derives from a first user message.
pub const MAX_TITLE_CHARS: usize = 60;

#[must_use]
pub fn sanitize_timestamp_for_filename(timestamp: &str) -> String {
    timestamp
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' => '-',
            _ => c,
        })
        .collect()
}

#[must_use]
pub fn conversation_file_name(created_at: &str, conversation_id: &str) -> String {
    format!(
        "{}_{}.jsonl",
        sanitize_timestamp_for_filename(created_at),
        conversation_id
    )
}

/// Derives a conversation title from the first user message.
#[must_use]
pub fn derive_title(first_user_message: &str) -> String {
    first_user_message
        .trim()
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect()
}
