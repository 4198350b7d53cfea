/// Default base URL for the locally-supervised backend.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

const STREAM_PATH: &str = "/models/chat/stream";
const HEALTH_PATH: &str = "/health";

/// Normalize a base URL to the streaming chat endpoint.
///
/// Normalization rules:
/// 1) keep a URL already ending in `/models/chat/stream` unchanged
/// 2) append `/models/chat/stream` otherwise
pub fn normalize_stream_url(input: &str) -> String {
    normalize_with_path(input, STREAM_PATH)
}

/// Normalize a base URL to the liveness probe endpoint.
pub fn normalize_health_url(input: &str) -> String {
    normalize_with_path(input, HEALTH_PATH)
}

fn normalize_with_path(input: &str, path: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with(path) {
        return trimmed.to_string();
    }
    format!("{trimmed}{path}")
}
