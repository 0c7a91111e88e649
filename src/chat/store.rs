//! Chat persistence

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Chat;
use crate::{Error, Result};

/// Loads and saves the full chat list
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Load all chats
    ///
    /// # Errors
    ///
    /// Returns error if the chats cannot be read
    async fn load_chats(&self) -> Result<Vec<Chat>>;

    /// Replace all stored chats
    ///
    /// # Errors
    ///
    /// Returns error if the chats cannot be written
    async fn save_chats(&self, chats: &[Chat]) -> Result<()>;
}

/// Stores chats as a JSON array in a local file
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store backed by `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChatStore for JsonFileStore {
    async fn load_chats(&self) -> Result<Vec<Chat>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_chats(&self, chats: &[Chat]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a sibling file first so a crash never leaves a truncated history
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(chats)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), chats = chats.len(), "saved chats");
        Ok(())
    }
}

#[derive(Serialize)]
struct SaveChatsRequest<'a> {
    chats: &'a [Chat],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LoadChatsResponse {
    Bare(Vec<Chat>),
    Wrapped { chats: Vec<Chat> },
}

/// Syncs chats with a remote server: `GET/POST {base_url}/chats`
pub struct HttpChatStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpChatStore {
    /// Create a remote store
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ChatStore for HttpChatStore {
    async fn load_chats(&self) -> Result<Vec<Chat>> {
        let response = self
            .authorize(self.client.get(format!("{}/chats", self.base_url)))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!("load chats failed {status}: {body}")));
        }

        Ok(match response.json::<LoadChatsResponse>().await? {
            LoadChatsResponse::Bare(chats) | LoadChatsResponse::Wrapped { chats } => chats,
        })
    }

    async fn save_chats(&self, chats: &[Chat]) -> Result<()> {
        let response = self
            .authorize(self.client.post(format!("{}/chats", self.base_url)))
            .json(&SaveChatsRequest { chats })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!("save chats failed {status}: {body}")));
        }
        Ok(())
    }
}
