use reqwest::Client;
use tracing::{debug, error, info};

use super::models::{ChatMessage, ChatRequest, TagsResponse};
use super::stream::CompletionStream;
use crate::error::ConnectionError;

/// Client for the Ollama HTTP API.
///
/// Owns the transport; each streaming exchange hands its response body to a
/// `CompletionStream` cursor. Dropping the client releases all transport
/// resources.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        debug!("initialized client with base URL: {}", base_url);
        Self {
            client: Client::new(),
            base_url,
        }
    }

    /// Lightweight reachability probe. Never errors; failures are logged
    /// and reported as `false` so callers can use this as a pre-flight
    /// check.
    pub async fn check_availability(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("model server reachable at {}", self.base_url);
                true
            }
            Ok(response) => {
                error!(
                    "availability probe got HTTP {} from {}",
                    response.status(),
                    self.base_url
                );
                false
            }
            Err(e) => {
                error!("failed to connect to {}: {}", self.base_url, e);
                false
            }
        }
    }

    /// Fetch the names of the models the server has available.
    pub async fn list_models(&self) -> Result<Vec<String>, ConnectionError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ConnectionError::network(&e))?;

        if !response.status().is_success() {
            return Err(ConnectionError::Status(response.status().as_u16()));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ConnectionError::InvalidResponse(format!("model list: {}", e)))?;

        let models: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
        info!("found {} available models", models.len());
        Ok(models)
    }

    /// Open one streaming exchange for `history` and return the fragment
    /// cursor bound to it. A non-success status at open time is a
    /// `ConnectionError`; retry policy, if any, belongs to the caller.
    pub async fn stream_completion(
        &self,
        model: &str,
        history: &[ChatMessage],
    ) -> Result<CompletionStream, ConnectionError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model: model.to_string(),
            messages: history.to_vec(),
            stream: true,
        };

        info!("opening streaming exchange with model: {}", model);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ConnectionError::network(&e))?;

        if !response.status().is_success() {
            return Err(ConnectionError::Status(response.status().as_u16()));
        }

        Ok(CompletionStream::new(response))
    }
}
