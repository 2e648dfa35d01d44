pub mod session;
pub mod storage;

pub use session::ConversationSession;
pub use storage::ConversationStore;
