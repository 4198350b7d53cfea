use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};

use crate::config::ChatApiConfig;
use crate::error::{parse_error_message, ChatApiError};
use crate::events::ChatStreamEvent;
use crate::ndjson::NdjsonStreamParser;
use crate::payload::ChatRequest;
use crate::retry::{is_retryable_http_error, retry_delay_ms, MAX_RETRIES};
use crate::url::{normalize_health_url, normalize_stream_url};

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

const OPENROUTER_KEY_HEADER: &str = "x-openrouter-key";

/// Explicit end-of-stream marker observed by [`ChatApiClient::stream_with_handler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTerminal {
    Completed,
}

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn stream_endpoint(&self) -> String {
        normalize_stream_url(&self.config.base_url)
    }

    pub fn health_endpoint(&self) -> String {
        normalize_health_url(&self.config.base_url)
    }

    fn build_headers(&self) -> Result<HeaderMap, ChatApiError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = self.config.openrouter_key.as_deref() {
            headers.insert(
                OPENROUTER_KEY_HEADER,
                HeaderValue::from_str(key).map_err(|_| {
                    ChatApiError::InvalidBaseUrl("invalid openrouter key header value".to_string())
                })?,
            );
        }
        if let Some(user_agent) = self.config.user_agent.as_deref() {
            headers.insert(
                reqwest::header::USER_AGENT,
                HeaderValue::from_str(user_agent).map_err(|_| {
                    ChatApiError::InvalidBaseUrl("invalid user agent header value".to_string())
                })?,
            );
        }
        Ok(headers)
    }

    pub fn build_request(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::RequestBuilder, ChatApiError> {
        let headers = self.build_headers()?;
        Ok(self
            .http
            .post(self.stream_endpoint())
            .headers(headers)
            .json(request))
    }

    /// Send the request, retrying transient failures with backoff.
    ///
    /// Retries only happen here, before any stream byte is consumed; once a
    /// response body starts streaming, failures belong to the session.
    pub async fn send_with_retry(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, ChatApiError> {
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }

            let response = self.build_request(request)?.send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(ChatApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    let status = response.status();
                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_else(|_| {
                            status
                                .canonical_reason()
                                .unwrap_or("request failed")
                                .to_string()
                        });
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < MAX_RETRIES && is_retryable_http_error(status.as_u16(), &message) {
                        log::debug!(
                            "retrying chat request after HTTP {status} (attempt {attempt}): {message}"
                        );
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancellation)
                            .await?;
                        continue;
                    }

                    return Err(ChatApiError::Status(status, message));
                }
                Err(error) => {
                    let message = error.to_string();
                    last_error = Some(message.clone());
                    if attempt < MAX_RETRIES && is_retryable_http_error(0, &message) {
                        log::debug!("retrying chat request after transport error: {message}");
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancellation)
                            .await?;
                        continue;
                    }
                    return Err(error);
                }
            }
        }

        Err(ChatApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Stream one chat turn, invoking `on_event` for each decoded event in
    /// arrival order.
    ///
    /// Returns only after an explicit `done` event; a stream that ends
    /// without one is [`ChatApiError::MissingTerminal`], an in-band error
    /// event is [`ChatApiError::StreamFailed`], and a signalled token aborts
    /// the transport read with [`ChatApiError::Cancelled`].
    pub async fn stream_with_handler<F>(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<StreamTerminal, ChatApiError>
    where
        F: FnMut(ChatStreamEvent),
    {
        let response = self.send_with_retry(request, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = NdjsonStreamParser::default();
        let mut completed = false;

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            let chunk = chunk.map_err(ChatApiError::from)?;
            for event in parser.feed(&chunk) {
                if let ChatStreamEvent::Error { message } = event {
                    return Err(ChatApiError::StreamFailed {
                        message: message.unwrap_or_else(|| "backend reported an error".to_string()),
                    });
                }
                if matches!(event, ChatStreamEvent::Done) {
                    completed = true;
                }
                on_event(event);
            }
        }

        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }
        if !completed {
            return Err(ChatApiError::MissingTerminal);
        }

        Ok(StreamTerminal::Completed)
    }

    /// One-shot liveness probe against the backend's health endpoint.
    pub async fn probe_health(
        &self,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<(), ChatApiError> {
        let response = self.http.get(self.health_endpoint()).send();
        let response = await_or_cancel(response, cancellation).await??;
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        Err(ChatApiError::Status(
            status,
            status
                .canonical_reason()
                .unwrap_or("health probe failed")
                .to_string(),
        ))
    }

    /// Poll the health endpoint until it answers or `wait` elapses.
    pub async fn wait_until_ready(
        &self,
        wait: Duration,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<(), ChatApiError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match self.probe_health(cancellation).await {
                Ok(()) => return Ok(()),
                Err(ChatApiError::Cancelled) => return Err(ChatApiError::Cancelled),
                Err(error) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(error);
                    }
                }
            }
            await_or_cancel(tokio::time::sleep(READY_POLL_INTERVAL), cancellation).await?;
        }
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::{await_or_cancel, ChatApiClient};
    use crate::config::ChatApiConfig;
    use crate::error::ChatApiError;

    #[tokio::test(flavor = "multi_thread")]
    async fn await_or_cancel_unwinds_pending_future_when_signalled() {
        let cancel = Arc::new(AtomicBool::new(false));
        let pending = tokio::time::sleep(std::time::Duration::from_secs(600));

        let waiter = await_or_cancel(pending, Some(&cancel));
        cancel.store(true, Ordering::Release);

        match waiter.await {
            Err(ChatApiError::Cancelled) => {}
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn await_or_cancel_passes_through_without_signal() {
        let output = await_or_cancel(async { 41 + 1 }, None)
            .await
            .expect("uncancellable future should complete");
        assert_eq!(output, 42);
    }

    #[test]
    fn endpoints_derive_from_configured_base_url() {
        let client = ChatApiClient::new(ChatApiConfig::new("http://127.0.0.1:9901"))
            .expect("client should build");

        assert_eq!(
            client.stream_endpoint(),
            "http://127.0.0.1:9901/models/chat/stream"
        );
        assert_eq!(client.health_endpoint(), "http://127.0.0.1:9901/health");
    }
}
