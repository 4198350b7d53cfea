//! Transport and session primitives for the streaming chat protocol.
//!
//! This crate owns the client side of one streamed chat turn: building the
//! request, parsing the backend's newline-delimited event stream into typed
//! events, and reconciling those events into an ordered transcript with
//! cooperative cancellation. It intentionally contains no process
//! management and no UI coupling; the backend only needs to be reachable.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod ndjson;
pub mod payload;
pub mod retry;
pub mod session;
pub mod transcript;
pub mod url;

pub use client::{CancellationSignal, ChatApiClient, StreamTerminal};
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use events::ChatStreamEvent;
pub use ndjson::NdjsonStreamParser;
pub use payload::{ChatMessage, ChatRequest};
pub use session::{SessionError, SessionOutcome, SessionState, StreamSession};
pub use transcript::{ChatTurn, Transcript, TurnRole};
pub use url::{normalize_health_url, normalize_stream_url};
