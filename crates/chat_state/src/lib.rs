//! chat_state - Event reducer and session protocol for branching chats
//!
//! - `event` - the stream event union emitted while a request generates
//! - `reducer` - folds stream events into a `TreeSnapshot`
//! - `machine` - Idle / Running / terminal request status
//! - `protocol` - client and server frames
//! - `session` - server-side per-conversation bookkeeping
//! - `client` - client-side cursor, dedupe and resync handling

pub mod client;
pub mod error;
pub mod event;
pub mod machine;
pub mod protocol;
pub mod reducer;
pub mod session;

pub use client::ClientSession;
pub use error::ProtocolError;
pub use event::{ConversationSummary, StreamEvent};
pub use machine::{ChatStatus, StatusEvent, StatusMachine, StatusTransition, TransitionError};
pub use protocol::{
    events_after, ChatEventEnvelope, ChatRequest, ClientMessage, EventId, ServerMessage,
};
pub use reducer::{
    apply_assistant_addition, ensure_assistant_target, reduce, replay, stable_json_string,
    ConversationChange, Reduction,
};
pub use session::{AbortOutcome, ChatSession};
