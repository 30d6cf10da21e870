//! Event fan-out for one loop run
//!
//! Every event the loop produces is folded into the run's working snapshot
//! and then sent on the event channel. A closed channel is not an error;
//! the run keeps its own snapshot either way.

use chrono::Utc;
use tokio::sync::mpsc;

use agent_core::Conversation;
use chat_core::TreeSnapshot;
use chat_state::{reduce, StreamEvent};

pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    conversation: Conversation,
}

impl EventSink {
    pub fn new(conversation: Conversation, tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx, conversation }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation.id
    }

    pub fn snapshot(&self) -> &TreeSnapshot {
        &self.conversation.snapshot
    }

    pub fn into_snapshot(self) -> TreeSnapshot {
        self.conversation.snapshot
    }

    pub async fn emit(&mut self, event: StreamEvent) {
        let state = std::mem::take(&mut self.conversation.snapshot);
        self.conversation.snapshot = reduce(state, &event, Utc::now()).snapshot;

        if self.tx.send(event).await.is_err() {
            log::debug!(
                "[{}] Event receiver dropped, continuing without it",
                self.conversation.id
            );
        }
    }

    /// Emits `conversation_updated` with the current message count.
    pub async fn emit_updated(&mut self) {
        self.conversation.updated_at = Utc::now();
        let summary = self.conversation.summary();
        self.emit(StreamEvent::ConversationUpdated {
            conversation: summary,
        })
        .await;
    }
}
