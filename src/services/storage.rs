use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::models::{Conversation, ConversationSummary, Message, Role};

const TITLE_MAX_CHARS: usize = 50;

/// Durable record format: one JSON document per conversation, keyed by the
/// conversation id. Optional fields stay lenient on read so one odd file
/// cannot poison a listing.
#[derive(Debug, Serialize, Deserialize)]
struct ConversationRecord {
    id: String,
    title: Option<String>,
    model: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    messages: Vec<Message>,
}

/// Persists conversations as `{id}.json` files under a single directory.
///
/// Stateless aside from the directory it is rooted at; `save` always
/// rewrites the full record and is the only path that changes `updated_at`.
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create conversation directory {}", dir.display()))?;
        info!("conversation store rooted at {}", dir.display());
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Write the full conversation, overwriting any prior record with the
    /// same id. Write failures propagate; losing a conversation silently is
    /// worse than surfacing the fault.
    pub async fn save(&self, conversation: &Conversation) -> Result<()> {
        let title = derive_title(conversation);
        let record = ConversationRecord {
            id: conversation.id.clone(),
            title: Some(title.clone()),
            model: conversation.model.clone(),
            created_at: conversation.created_at,
            updated_at: Some(Utc::now()),
            messages: conversation.messages.clone(),
        };

        let json = serde_json::to_string_pretty(&record)
            .with_context(|| format!("failed to serialize conversation {}", conversation.id))?;

        let path = self.path_for(&conversation.id);
        fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write conversation to {}", path.display()))?;

        info!("saved conversation {} ({})", conversation.id, title);
        Ok(())
    }

    /// Reconstruct a conversation from its record. A missing record is a
    /// defined not-found outcome, not an error; so is a record that no
    /// longer parses — one corrupt file must not break resumption, it is
    /// logged and treated as absent.
    pub async fn load(&self, id: &str) -> Result<Option<Conversation>> {
        let path = self.path_for(id);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("conversation file not found: {}", id);
                return Ok(None);
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read conversation from {}", path.display()))
            }
        };

        let record: ConversationRecord = match serde_json::from_str(&json) {
            Ok(record) => record,
            Err(e) => {
                warn!("failed to parse conversation record {}: {}", id, e);
                return Ok(None);
            }
        };

        info!("loaded conversation {}", id);
        Ok(Some(Conversation {
            id: record.id,
            model: record.model,
            messages: record.messages,
            created_at: record.created_at,
        }))
    }

    /// Summaries of every stored conversation, most recently updated first.
    /// Individually unreadable records are logged and skipped, never fatal.
    pub async fn list(&self) -> Result<Vec<ConversationSummary>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("failed to read conversation directory {}", self.dir.display()))?;

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let json = match fs::read_to_string(&path).await {
                Ok(json) => json,
                Err(e) => {
                    warn!("failed to read conversation file {}: {}", path.display(), e);
                    continue;
                }
            };
            let record: ConversationRecord = match serde_json::from_str(&json) {
                Ok(record) => record,
                Err(e) => {
                    warn!("failed to parse conversation file {}: {}", path.display(), e);
                    continue;
                }
            };

            summaries.push(ConversationSummary {
                title: record
                    .title
                    .unwrap_or_else(|| "Untitled Conversation".to_string()),
                model: record.model,
                created_at: record.created_at,
                updated_at: record.updated_at.unwrap_or(record.created_at),
                message_count: record.messages.len(),
                id: record.id,
            });
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        info!("listed {} conversations", summaries.len());
        Ok(summaries)
    }

    /// Remove a record. Returns whether a record existed to remove; never
    /// errors.
    pub async fn delete(&self, id: &str) -> bool {
        let path = self.path_for(id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("deleted conversation {}", id);
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("conversation not found for deletion: {}", id);
                false
            }
            Err(e) => {
                warn!("failed to delete conversation {}: {}", id, e);
                false
            }
        }
    }

    pub async fn exists(&self, id: &str) -> bool {
        fs::try_exists(self.path_for(id)).await.unwrap_or(false)
    }
}

/// Title for a stored conversation: the first user message trimmed, with
/// newlines collapsed to spaces and capped at 50 characters plus `...` when
/// truncated. Falls back to the creation time when no user message exists.
fn derive_title(conversation: &Conversation) -> String {
    let first_user = conversation
        .messages
        .iter()
        .find(|m| m.role == Role::User);

    let Some(message) = first_user else {
        return format!("Chat {}", conversation.created_at.format("%Y-%m-%d %H:%M"));
    };

    let collapsed = message.content.trim().replace('\n', " ");
    if collapsed.chars().count() > TITLE_MAX_CHARS {
        let truncated: String = collapsed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", truncated)
    } else {
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;

    fn conversation_with(model: &str, contents: &[(&str, Role)]) -> Conversation {
        let mut conversation = Conversation::new(model);
        for (content, role) in contents {
            conversation.push(Message::new(*role, *content));
        }
        conversation
    }

    #[tokio::test]
    async fn save_then_load_round_trips_exactly() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).await.unwrap();

        let conversation = conversation_with(
            "llama2",
            &[("Hello there", Role::User), ("Hi!", Role::Assistant)],
        );
        store.save(&conversation).await.unwrap();

        let loaded = store.load(&conversation.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, conversation.id);
        assert_eq!(loaded.model, conversation.model);
        assert_eq!(loaded.created_at, conversation.created_at);
        assert_eq!(loaded.messages.len(), conversation.messages.len());
        for (loaded_msg, original) in loaded.messages.iter().zip(&conversation.messages) {
            assert_eq!(loaded_msg.id, original.id);
            assert_eq!(loaded_msg.role, original.role);
            assert_eq!(loaded_msg.content, original.content);
            assert_eq!(loaded_msg.timestamp, original.timestamp);
        }
    }

    #[tokio::test]
    async fn load_of_missing_id_is_not_found() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).await.unwrap();
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_of_corrupt_record_is_not_found() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("abc.json"), "{ not json").unwrap();
        assert!(store.load("abc").await.unwrap().is_none());
    }

    #[test]
    fn short_title_is_kept_verbatim() {
        let conversation = conversation_with("llama2", &[("Hello", Role::User)]);
        assert_eq!(derive_title(&conversation), "Hello");
    }

    #[test]
    fn long_title_is_capped_with_ellipsis() {
        let content = "x".repeat(80);
        let conversation = conversation_with("llama2", &[(content.as_str(), Role::User)]);
        let title = derive_title(&conversation);
        assert_eq!(title.chars().count(), 53);
        assert_eq!(title, format!("{}...", "x".repeat(50)));
    }

    #[test]
    fn title_collapses_whitespace() {
        let conversation = conversation_with("llama2", &[("  Hi\nthere  ", Role::User)]);
        assert_eq!(derive_title(&conversation), "Hi there");
    }

    #[test]
    fn title_falls_back_without_user_messages() {
        let conversation = conversation_with("llama2", &[("beep", Role::Assistant)]);
        let title = derive_title(&conversation);
        assert!(title.starts_with("Chat "));
        assert_ne!(title, "beep");
    }

    #[tokio::test]
    async fn list_sorts_by_update_recency() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).await.unwrap();

        let first = conversation_with("llama2", &[("one", Role::User)]);
        let second = conversation_with("llama2", &[("two", Role::User)]);
        let third = conversation_with("llama2", &[("three", Role::User)]);
        for conversation in [&first, &second, &third] {
            store.save(conversation).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let summaries = store.list().await.unwrap();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].id, third.id);
        assert_eq!(summaries[2].id, first.id);

        // Re-saving an existing id moves it to the front.
        store.save(&first).await.unwrap();
        let summaries = store.list().await.unwrap();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].id, first.id);
    }

    #[tokio::test]
    async fn list_skips_corrupt_records() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).await.unwrap();

        let conversation = conversation_with("llama2", &[("fine", Role::User)]);
        store.save(&conversation).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let summaries = store.list().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, conversation.id);
        assert_eq!(summaries[0].message_count, 1);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_record_existed() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).await.unwrap();

        let conversation = conversation_with("llama2", &[("bye", Role::User)]);
        store.save(&conversation).await.unwrap();

        assert!(store.exists(&conversation.id).await);
        assert!(store.delete(&conversation.id).await);
        assert!(!store.exists(&conversation.id).await);
        assert!(!store.delete(&conversation.id).await);
    }
}
