use tracing::{info, warn};

use crate::api::{ChatMessage, OllamaClient};
use crate::error::{ChatError, ConnectionError};
use crate::models::{Conversation, ConversationSummary, Message, Role};
use crate::services::storage::ConversationStore;

/// Orchestrates one conversation at a time: owns the in-memory state,
/// drives the client for each user turn, and persists after every completed
/// exchange.
///
/// `send_message` takes `&mut self` for the whole exchange, so at most one
/// exchange can be in flight per session; callers that want concurrency
/// must serialize or queue. For the same reason the model cannot change
/// while a send is in progress.
pub struct ConversationSession {
    client: OllamaClient,
    store: ConversationStore,
    conversation: Option<Conversation>,
    model: String,
}

impl ConversationSession {
    pub fn new(
        client: OllamaClient,
        store: ConversationStore,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            store,
            conversation: None,
            model: default_model.into(),
        }
    }

    /// Begin a fresh conversation, discarding any unsaved in-memory state of
    /// the previous one.
    pub fn start_new_conversation(&mut self, model: Option<&str>) {
        if let Some(model) = model {
            self.model = model.to_string();
        }
        self.conversation = Some(Conversation::new(self.model.clone()));
        info!("started new conversation with model: {}", self.model);
    }

    /// Send one user turn and stream the reply.
    ///
    /// The user message is appended immediately, before the exchange opens;
    /// each fragment is handed to `on_fragment` in delivery order while
    /// being accumulated. On completion the full reply becomes one
    /// assistant message and the conversation is saved. On failure the
    /// error propagates, the user message stays, no assistant message is
    /// appended and nothing is saved — the next successful exchange
    /// persists both turns together.
    pub async fn send_message<F>(&mut self, content: &str, mut on_fragment: F) -> Result<(), ChatError>
    where
        F: FnMut(&str),
    {
        let model = self.model.clone();
        let conversation = self.conversation.get_or_insert_with(|| {
            warn!("no active conversation, starting a new one");
            Conversation::new(model)
        });

        conversation.push(Message::new(Role::User, content));
        let history: Vec<ChatMessage> =
            conversation.messages.iter().map(ChatMessage::from).collect();

        let mut stream = self.client.stream_completion(&self.model, &history).await?;
        let mut reply = String::new();
        while let Some(fragment) = stream.next_fragment().await? {
            reply.push_str(&fragment);
            on_fragment(&fragment);
        }

        info!("assistant reply completed: {} chars", reply.len());
        conversation.push(Message::new(Role::Assistant, reply));
        self.store.save(conversation).await?;
        Ok(())
    }

    /// Change the active model. Also updates the live conversation so the
    /// change is recorded on the next save.
    pub fn set_model(&mut self, name: &str) {
        self.model = name.to_string();
        if let Some(conversation) = &mut self.conversation {
            conversation.model = name.to_string();
        }
        info!("model changed to: {}", self.model);
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation
            .as_ref()
            .map(|c| c.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn current_conversation_id(&self) -> Option<&str> {
        self.conversation.as_ref().map(|c| c.id.as_str())
    }

    pub fn clear_conversation(&mut self) {
        if let Some(conversation) = &mut self.conversation {
            conversation.messages.clear();
            info!("conversation cleared");
        }
    }

    /// Resume a stored conversation. Returns whether it was found; on
    /// success the session adopts the conversation and its model.
    pub async fn load_conversation(&mut self, id: &str) -> Result<bool, ChatError> {
        match self.store.load(id).await? {
            Some(conversation) => {
                self.model = conversation.model.clone();
                info!("resumed conversation {}", conversation.id);
                self.conversation = Some(conversation);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ChatError> {
        Ok(self.store.list().await?)
    }

    /// Delete a stored conversation. Clears the in-memory conversation when
    /// it is the one being deleted.
    pub async fn delete_conversation(&mut self, id: &str) -> bool {
        let deleted = self.store.delete(id).await;
        if self.conversation.as_ref().is_some_and(|c| c.id == id) {
            self.conversation = None;
            info!("deleted the active conversation");
        }
        deleted
    }

    pub async fn check_availability(&self) -> bool {
        self.client.check_availability().await
    }

    pub async fn list_models(&self) -> Result<Vec<String>, ConnectionError> {
        self.client.list_models().await
    }
}
