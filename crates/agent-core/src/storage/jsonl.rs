use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chat_state::{ChatEventEnvelope, EventId};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::{paginate, validate_id, ConversationPage, ListQuery, Result, Storage};
use crate::agent::Conversation;

/// One `<id>.json` snapshot and one `<id>.jsonl` event log per conversation.
#[derive(Debug, Clone)]
pub struct JsonlStorage {
    base_path: PathBuf,
}

impl JsonlStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub async fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.base_path).await
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    async fn read_events(&self, conversation_id: &str) -> Result<Vec<ChatEventEnvelope>> {
        let path = self.events_path(conversation_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(event) => events.push(event),
                Err(e) => log::warn!("[{}] Skipping corrupt event line: {}", conversation_id, e),
            }
        }

        Ok(events)
    }

    fn conversation_path(&self, id: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", id))
    }

    fn events_path(&self, id: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", id))
    }
}

#[async_trait]
impl Storage for JsonlStorage {
    async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        validate_id(id)?;
        let path = self.conversation_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        validate_id(&conversation.id)?;
        let path = self.conversation_path(&conversation.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(conversation)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        validate_id(id)?;
        let mut deleted_any = false;

        for path in [self.conversation_path(id), self.events_path(id)] {
            match fs::remove_file(&path).await {
                Ok(()) => deleted_any = true,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
        }

        Ok(deleted_any)
    }

    async fn list(&self, query: &ListQuery) -> Result<ConversationPage> {
        let mut summaries = Vec::new();
        if self.base_path.exists() {
            let mut entries = fs::read_dir(&self.base_path).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let content = fs::read_to_string(&path).await?;
                match serde_json::from_str::<Conversation>(&content) {
                    Ok(conversation) => summaries.push(conversation.summary()),
                    Err(e) => log::warn!("Skipping unreadable {}: {}", path.display(), e),
                }
            }
        }
        paginate(summaries, query)
    }

    async fn append_event(&self, conversation_id: &str, event: &ChatEventEnvelope) -> Result<()> {
        validate_id(conversation_id)?;
        let json = serde_json::to_string(event)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.events_path(conversation_id))
            .await?;
        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }

    async fn load_events_after(
        &self,
        conversation_id: &str,
        last_event_id: Option<EventId>,
    ) -> Result<Vec<ChatEventEnvelope>> {
        validate_id(conversation_id)?;
        let events = self.read_events(conversation_id).await?;
        Ok(chat_state::events_after(&events, last_event_id))
    }

    async fn last_event_id(&self, conversation_id: &str) -> Result<EventId> {
        validate_id(conversation_id)?;
        let events = self.read_events(conversation_id).await?;
        Ok(events.iter().map(|e| e.event_id).max().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_state::StreamEvent;
    use chrono::Utc;

    fn envelope(event_id: EventId) -> ChatEventEnvelope {
        ChatEventEnvelope {
            event_id,
            request_id: "r1".to_string(),
            created_at: Utc::now(),
            event: StreamEvent::content(format!("e{event_id}")),
        }
    }

    async fn create_temp_storage() -> (JsonlStorage, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = JsonlStorage::new(temp_dir.path());
        storage.init().await.unwrap();
        (storage, temp_dir)
    }

    #[tokio::test]
    async fn save_and_get_round_trip() {
        let (storage, _dir) = create_temp_storage().await;
        let mut conversation = Conversation::new("conv-1");
        conversation.title = "hello".to_string();

        storage.save(&conversation).await.unwrap();
        let loaded = storage.get("conv-1").await.unwrap().unwrap();

        assert_eq!(loaded, conversation);
        assert!(storage.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn events_replay_after_cursor() {
        let (storage, _dir) = create_temp_storage().await;
        for id in [5, 6, 7] {
            storage.append_event("conv-1", &envelope(id)).await.unwrap();
        }

        let replayed = storage.load_events_after("conv-1", Some(6)).await.unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].event_id, 7);
        assert_eq!(storage.last_event_id("conv-1").await.unwrap(), 7);
        assert_eq!(storage.last_event_id("other").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_removes_snapshot_and_events() {
        let (storage, _dir) = create_temp_storage().await;
        storage.save(&Conversation::new("conv-1")).await.unwrap();
        storage.append_event("conv-1", &envelope(1)).await.unwrap();

        assert!(storage.delete("conv-1").await.unwrap());
        assert!(!storage.conversation_path("conv-1").exists());
        assert!(!storage.events_path("conv-1").exists());
        assert!(!storage.delete("conv-1").await.unwrap());
    }

    #[tokio::test]
    async fn list_reads_every_snapshot() {
        let (storage, _dir) = create_temp_storage().await;
        storage.save(&Conversation::new("a")).await.unwrap();
        storage.save(&Conversation::new("b")).await.unwrap();
        storage.append_event("a", &envelope(1)).await.unwrap();

        let page = storage.list(&ListQuery::default()).await.unwrap();
        assert_eq!(page.conversations.len(), 2);
    }

    #[tokio::test]
    async fn path_traversal_ids_are_rejected() {
        let (storage, _dir) = create_temp_storage().await;
        assert!(storage.get("../secret").await.is_err());
    }
}
