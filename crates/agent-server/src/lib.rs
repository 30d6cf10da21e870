pub mod handlers;
pub mod hub;
pub mod logging;
pub mod server;
pub mod state;

pub use hub::{BeginOutcome, SessionHandle, SessionHub, StartedRequest};
pub use server::{app_config, run_server, run_server_with_state};
pub use state::AppState;
