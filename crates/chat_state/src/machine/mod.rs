//! Request status machine
//!
//! Tracks the Idle / Running / terminal lifecycle shared by the server-side
//! session and the client.

mod events;
mod states;
mod transitions;

pub use events::StatusEvent;
pub use states::ChatStatus;
pub use transitions::{StatusMachine, StatusTransition, TransitionError};
