//! AI chat backend round trip

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Sends a user message to the AI backend and returns the reply text
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Perform one send/reply round trip
    ///
    /// # Errors
    ///
    /// Returns error if the backend is unreachable or rejects the message
    async fn send_chat(&self, text: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    reply: String,
}

/// HTTP backend: `POST {base_url}/chat` with `{"message"}`, answered by `{"reply"}`
pub struct HttpChatBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatBackend {
    /// Create a backend client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn send_chat(&self, text: &str) -> Result<String> {
        tracing::debug!(chars = text.len(), "sending chat message");

        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .json(&ChatRequest { message: text })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Dispatch(format!("chat backend error {status}: {body}")));
        }

        let result: ChatResponse = response.json().await?;
        Ok(result.reply)
    }
}
