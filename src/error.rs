use thiserror::Error;

/// The only error kind the network layer raises: the server could not be
/// reached, refused the exchange, or the stream broke while being read.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request failed: HTTP {0}")]
    Status(u16),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ConnectionError {
    pub(crate) fn network(err: &reqwest::Error) -> Self {
        ConnectionError::Network(err.to_string())
    }
}

/// Errors surfaced by `ConversationSession` across the public boundary:
/// either the exchange with the model server failed, or persisting the
/// conversation did.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
