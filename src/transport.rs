//! Blocking bridge over the async streaming client.
//!
//! The controller runs chat turns on plain worker threads; this module
//! hides the async transport behind a synchronous trait so the controller
//! (and its tests) never touch a runtime directly.

use std::time::Duration;

use chat_stream::{
    CancellationSignal, ChatApiClient, ChatApiConfig, ChatApiError, ChatRequest, ChatStreamEvent,
};

/// Synchronous view of one streamed chat turn.
pub trait StreamTransport: Send + Sync + 'static {
    /// Streams the request, delivering events in arrival order.
    ///
    /// Returns `Ok(())` only after the backend's explicit terminal event.
    fn stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationSignal,
        on_event: &mut dyn FnMut(ChatStreamEvent),
    ) -> Result<(), ChatApiError>;
}

/// Production transport backed by [`ChatApiClient`].
#[derive(Debug)]
pub struct HttpStreamTransport {
    client: ChatApiClient,
}

impl HttpStreamTransport {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        Ok(Self {
            client: ChatApiClient::new(config)?,
        })
    }

    /// Blocks until the backend answers its liveness probe or `wait`
    /// elapses.
    pub fn wait_until_ready(&self, wait: Duration) -> Result<(), ChatApiError> {
        let runtime = blocking_runtime()?;
        runtime.block_on(self.client.wait_until_ready(wait, None))
    }
}

impl StreamTransport for HttpStreamTransport {
    fn stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationSignal,
        on_event: &mut dyn FnMut(ChatStreamEvent),
    ) -> Result<(), ChatApiError> {
        let runtime = blocking_runtime()?;
        runtime
            .block_on(
                self.client
                    .stream_with_handler(request, Some(cancel), |event| on_event(event)),
            )
            .map(|_| ())
    }
}

fn blocking_runtime() -> Result<tokio::runtime::Runtime, ChatApiError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| ChatApiError::StreamFailed {
            message: format!("failed to initialize tokio runtime: {error}"),
        })
}
