use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum ChatApiError {
    InvalidBaseUrl(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    StreamFailed {
        message: String,
    },
    /// The stream ended without an explicit terminal event. Distinguished
    /// from [`ChatApiError::Cancelled`] so truncated responses are never
    /// mistaken for deliberate aborts.
    MissingTerminal,
    Cancelled,
}

/// Error body shape produced by the backend (`{"detail": ...}`).
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    pub detail: Option<serde_json::Value>,
}

impl fmt::Display for ChatApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(
                    f,
                    "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})"
                )
            }
            Self::StreamFailed { message } => write!(f, "stream failed: {message}"),
            Self::MissingTerminal => {
                write!(f, "stream ended without a terminal event")
            }
            Self::Cancelled => write!(f, "request was cancelled"),
        }
    }
}

impl std::error::Error for ChatApiError {}

impl From<reqwest::Error> for ChatApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for ChatApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Extract a human-readable message from a backend error body.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(ErrorPayload {
        detail: Some(detail),
    }) = serde_json::from_str::<ErrorPayload>(body)
    {
        let message = match detail {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        };
        if !message.trim().is_empty() {
            return message;
        }
    }

    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::parse_error_message;

    #[test]
    fn detail_string_is_extracted_from_error_body() {
        let message = parse_error_message(
            StatusCode::BAD_REQUEST,
            "{\"detail\":\"model and messages are required\"}",
        );
        assert_eq!(message, "model and messages are required");
    }

    #[test]
    fn structured_detail_is_rendered_as_json() {
        let message = parse_error_message(
            StatusCode::UNPROCESSABLE_ENTITY,
            "{\"detail\":[{\"loc\":[\"body\",\"model\"]}]}",
        );
        assert!(message.contains("loc"));
    }

    #[test]
    fn empty_body_falls_back_to_canonical_reason() {
        let message = parse_error_message(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(message, "Service Unavailable");
    }

    #[test]
    fn non_json_body_is_passed_through() {
        let message = parse_error_message(StatusCode::BAD_GATEWAY, "upstream connect error");
        assert_eq!(message, "upstream connect error");
    }
}
