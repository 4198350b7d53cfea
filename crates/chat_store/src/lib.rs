//! Conversation persistence for the chat client.
//!
//! One conversation is one append-only JSONL file: a header record
//! followed by turn records. The rest of the system touches this crate at
//! exactly two points: loading a conversation replaces the live transcript
//! wholesale, and the identifier reported by the stream's metadata channel
//! labels the record for later retrieval.

mod error;
mod paths;
mod schema;
mod store;

pub use error::ChatStoreError;
pub use paths::{conversation_file_name, derive_title};
pub use schema::{ConversationHeader, StoredTurn, TurnRecordType};
pub use store::{ChatStore, ConversationSummary, StoredConversation};
