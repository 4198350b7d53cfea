//! Client core for the ember desktop chat app.
//!
//! The UI in front of this crate is thin: it renders the transcript and
//! forwards user actions. Everything stateful lives here: the supervised
//! backend process (via `backend_runtime`), the streaming session protocol
//! (via `chat_stream`), conversation persistence (via `chat_store`), and
//! the [`app::ChatController`] that ties them together.
//!
//! ## Backend selection
//!
//! The supervisor launches the packaged runtime by default. Set
//! `EMBER_DEV_BACKEND` to a backend source tree (plus optionally
//! `EMBER_DEV_PYTHON`) for the development profile, or `EMBER_NO_SPAWN=1`
//! to attach to an already-running backend.

pub mod app;
pub mod config;
pub mod transport;

pub use app::{ChatController, SessionUpdate};
pub use config::EnvConfig;
pub use transport::{HttpStreamTransport, StreamTransport};
