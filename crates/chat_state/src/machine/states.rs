//! Request status - lifecycle of the single in-flight request of a conversation

use serde::{Deserialize, Serialize};

/// Status of a conversation's request slot.
///
/// `Running` is entered from any other status when a request starts; the
/// terminal statuses stay until the next request replaces them.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    /// No request has run since the session was opened.
    #[default]
    Idle,

    /// A request is generating.
    Running,

    /// The request finished normally (possibly with an embedded error block).
    Completed,

    /// The request was cancelled by the client.
    Aborted,

    /// The provider failed before the request could finish.
    Error,
}

impl ChatStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ChatStatus::Running)
    }

    /// Completed, Aborted and Error.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChatStatus::Completed | ChatStatus::Aborted | ChatStatus::Error
        )
    }
}

impl std::fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChatStatus::Idle => "idle",
            ChatStatus::Running => "running",
            ChatStatus::Completed => "completed",
            ChatStatus::Aborted => "aborted",
            ChatStatus::Error => "error",
        };
        f.write_str(name)
    }
}
