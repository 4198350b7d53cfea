use std::time::Duration;

use crate::url::DEFAULT_BASE_URL;

/// Transport configuration for streaming chat requests.
#[derive(Debug, Clone)]
pub struct ChatApiConfig {
    /// Base URL of the backend serving the streaming endpoint.
    pub base_url: String,
    /// Cloud routing key forwarded as the `x-openrouter-key` header.
    pub openrouter_key: Option<String>,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Optional connect timeout. Streams themselves are unbounded;
    /// long-running generations are expected.
    pub connect_timeout: Option<Duration>,
}

impl Default for ChatApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            openrouter_key: None,
            user_agent: None,
            connect_timeout: None,
        }
    }
}

impl ChatApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_openrouter_key(mut self, key: impl Into<String>) -> Self {
        self.openrouter_key = Some(key.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}
