pub mod client;
pub mod models;
pub mod stream;

pub use client::OllamaClient;
pub use models::ChatMessage;
pub use stream::CompletionStream;
