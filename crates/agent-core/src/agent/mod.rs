pub mod conversion;
pub mod error;
pub mod types;

pub use conversion::convert_path_to_messages;
pub use error::AgentError;
pub use types::{derive_title, Conversation, Message, Role};
