//! Sends finalized utterances to the chat backend
//!
//! The user message is appended before the round trip starts and removed
//! again, by identity, if the round trip fails. The displayed chat is a view
//! of the shared chat list, so it always shows both messages or neither.

use std::fmt;
use std::sync::Arc;

use crate::chat::{ChatBackend, ChatId, ChatStore, Message, MessageId, SharedChats};
use crate::{Error, Result};

/// A finalized, dispatch-ready utterance: trimmed and never empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance(String);

impl Utterance {
    /// Trim `text`; `None` if nothing is left
    #[must_use]
    pub fn new(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bridges utterances to the chat backend and records both sides in the chat list
#[derive(Clone)]
pub struct DispatchBridge {
    chats: SharedChats,
    backend: Arc<dyn ChatBackend>,
    store: Option<Arc<dyn ChatStore>>,
}

impl DispatchBridge {
    /// Create a bridge; `store` is saved to after every settled round trip
    #[must_use]
    pub fn new(
        chats: SharedChats,
        backend: Arc<dyn ChatBackend>,
        store: Option<Arc<dyn ChatStore>>,
    ) -> Self {
        Self {
            chats,
            backend,
            store,
        }
    }

    /// Chat list this bridge writes to
    #[must_use]
    pub const fn chats(&self) -> &SharedChats {
        &self.chats
    }

    /// Send one utterance to the displayed chat (created if none) and return the reply
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dispatch`] if the backend round trip fails; the
    /// optimistic user message has been removed by then
    pub async fn send(&self, utterance: Utterance) -> Result<String> {
        let (chat_id, message_id) = self.append_user_message(&utterance).await?;

        tracing::info!(chat_id = %chat_id, utterance = %utterance, "dispatching");

        match self.backend.send_chat(utterance.as_str()).await {
            Ok(reply) => {
                self.append_reply(chat_id, &reply).await;
                self.persist().await;
                Ok(reply)
            }
            Err(e) => {
                let removed = self.chats.write().await.remove_message(chat_id, message_id);
                tracing::warn!(
                    chat_id = %chat_id,
                    error = %e,
                    rolled_back = removed,
                    "dispatch failed"
                );
                self.persist().await;
                Err(match e {
                    Error::Dispatch(msg) => Error::Dispatch(msg),
                    other => Error::Dispatch(other.to_string()),
                })
            }
        }
    }

    async fn append_user_message(&self, utterance: &Utterance) -> Result<(ChatId, MessageId)> {
        let mut chats = self.chats.write().await;
        let chat_id = chats.current_or_create();
        let message_id = chats.push_message(chat_id, Message::user(utterance.as_str()))?;
        Ok((chat_id, message_id))
    }

    async fn append_reply(&self, chat_id: ChatId, reply: &str) {
        let mut chats = self.chats.write().await;
        if let Err(e) = chats.push_message(chat_id, Message::ai(reply)) {
            // Chat deleted while the round trip was in flight
            tracing::debug!(chat_id = %chat_id, error = %e, "reply dropped");
        }
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = self.chats.read().await.chats().to_vec();
        if let Err(e) = store.save_chats(&snapshot).await {
            tracing::warn!(error = %e, "failed to save chats");
        }
    }
}
