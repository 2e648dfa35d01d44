//! Core of a chat client for locally hosted language models: a streaming
//! protocol client for the Ollama API, the conversation state machine, and
//! JSON-file persistence of conversations. Front-ends (GUI, TUI, the bundled
//! CLI) drive everything through [`ConversationSession`].

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use api::{CompletionStream, OllamaClient};
pub use error::{ChatError, ConnectionError};
pub use models::{Conversation, ConversationSummary, Message, Role};
pub use services::{ConversationSession, ConversationStore};
