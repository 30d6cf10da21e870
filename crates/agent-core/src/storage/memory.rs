use std::collections::HashMap;

use async_trait::async_trait;
use chat_state::{ChatEventEnvelope, EventId};
use tokio::sync::RwLock;

use super::{paginate, validate_id, ConversationPage, ListQuery, Result, Storage};
use crate::agent::Conversation;

/// Process-local storage for tests and ephemeral servers.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    conversations: RwLock<HashMap<String, Conversation>>,
    events: RwLock<HashMap<String, Vec<ChatEventEnvelope>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        validate_id(id)?;
        Ok(self.conversations.read().await.get(id).cloned())
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        validate_id(&conversation.id)?;
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        validate_id(id)?;
        let removed = self.conversations.write().await.remove(id).is_some();
        let removed_events = self.events.write().await.remove(id).is_some();
        Ok(removed || removed_events)
    }

    async fn list(&self, query: &ListQuery) -> Result<ConversationPage> {
        let summaries = self
            .conversations
            .read()
            .await
            .values()
            .map(Conversation::summary)
            .collect();
        paginate(summaries, query)
    }

    async fn append_event(&self, conversation_id: &str, event: &ChatEventEnvelope) -> Result<()> {
        validate_id(conversation_id)?;
        self.events
            .write()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn load_events_after(
        &self,
        conversation_id: &str,
        last_event_id: Option<EventId>,
    ) -> Result<Vec<ChatEventEnvelope>> {
        let events = self.events.read().await;
        Ok(events
            .get(conversation_id)
            .map(|events| chat_state::events_after(events, last_event_id))
            .unwrap_or_default())
    }

    async fn last_event_id(&self, conversation_id: &str) -> Result<EventId> {
        let events = self.events.read().await;
        Ok(events
            .get(conversation_id)
            .and_then(|events| events.iter().map(|e| e.event_id).max())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_state::StreamEvent;
    use chrono::Utc;

    #[tokio::test]
    async fn memory_storage_behaves_like_the_trait_describes() {
        let storage = MemoryStorage::new();
        storage.save(&Conversation::new("c1")).await.unwrap();
        for event_id in 1..=3 {
            storage
                .append_event(
                    "c1",
                    &ChatEventEnvelope {
                        event_id,
                        request_id: "r1".to_string(),
                        created_at: Utc::now(),
                        event: StreamEvent::content("x"),
                    },
                )
                .await
                .unwrap();
        }

        assert_eq!(storage.last_event_id("c1").await.unwrap(), 3);
        assert_eq!(storage.load_events_after("c1", Some(1)).await.unwrap().len(), 2);
        assert_eq!(storage.list(&ListQuery::default()).await.unwrap().conversations.len(), 1);

        assert!(storage.delete("c1").await.unwrap());
        assert!(storage.get("c1").await.unwrap().is_none());
        assert_eq!(storage.last_event_id("c1").await.unwrap(), 0);
    }
}
