//! Chat application layer
//!
//! Owns the shared chat list and wires the store, the backend and the voice
//! controller together. Any operation that changes which chat is displayed
//! takes voice mode out of its session first.

use std::sync::Arc;

use crate::chat::{Chat, ChatBackend, ChatId, ChatList, ChatStore, SharedChats};
use crate::voice::{DispatchBridge, Utterance, VoiceHandle};
use crate::{Error, Result};

/// Chat list plus the collaborators that read and write it
pub struct ChatApp {
    chats: SharedChats,
    store: Arc<dyn ChatStore>,
    bridge: DispatchBridge,
    voice: Option<VoiceHandle>,
}

impl ChatApp {
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>, backend: Arc<dyn ChatBackend>) -> Self {
        let chats = ChatList::new().into_shared();
        let bridge = DispatchBridge::new(Arc::clone(&chats), backend, Some(Arc::clone(&store)));
        Self {
            chats,
            store,
            bridge,
            voice: None,
        }
    }

    /// Bridge the voice controller should dispatch through
    #[must_use]
    pub fn bridge(&self) -> DispatchBridge {
        self.bridge.clone()
    }

    /// Attach the voice controller handle
    pub fn attach_voice(&mut self, handle: VoiceHandle) {
        self.voice = Some(handle);
    }

    #[must_use]
    pub const fn voice(&self) -> Option<&VoiceHandle> {
        self.voice.as_ref()
    }

    #[must_use]
    pub const fn chats(&self) -> &SharedChats {
        &self.chats
    }

    /// Replace the chat list with the stored chats
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read
    pub async fn load(&self) -> Result<usize> {
        let chats = self.store.load_chats().await?;
        let count = chats.len();
        self.chats.write().await.replace_all(chats);
        tracing::info!(chats = count, "loaded chats");
        Ok(count)
    }

    /// Write the chat list to the store
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be written
    pub async fn save(&self) -> Result<()> {
        let snapshot = self.chats.read().await.chats().to_vec();
        self.store.save_chats(&snapshot).await
    }

    /// Snapshot of all chats, newest first
    pub async fn list(&self) -> Vec<Chat> {
        self.chats.read().await.chats().to_vec()
    }

    /// The displayed chat
    pub async fn current(&self) -> Option<Chat> {
        self.chats.read().await.current().cloned()
    }

    /// Create a chat and display it
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be written
    pub async fn new_chat(&self) -> Result<ChatId> {
        self.exit_voice();
        let id = self.chats.write().await.create_chat();
        self.save().await?;
        Ok(id)
    }

    /// Display a chat
    ///
    /// # Errors
    ///
    /// Returns error if the chat does not exist
    pub async fn select_chat(&self, id: ChatId) -> Result<()> {
        let mut chats = self.chats.write().await;
        if chats.current_id() == Some(id) {
            return Ok(());
        }
        chats.select(id)?;
        drop(chats);
        self.exit_voice();
        Ok(())
    }

    /// Rename a chat
    ///
    /// # Errors
    ///
    /// Returns error if the chat does not exist or the store cannot be written
    pub async fn rename_chat(&self, id: ChatId, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::Store("chat title cannot be empty".to_string()));
        }
        self.chats.write().await.rename(id, title)?;
        self.save().await
    }

    /// Delete a chat, leaving voice mode if it was displayed
    ///
    /// # Errors
    ///
    /// Returns error if the chat does not exist or the store cannot be written
    pub async fn delete_chat(&self, id: ChatId) -> Result<()> {
        let was_current = self.chats.write().await.delete(id)?;
        if was_current {
            self.exit_voice();
        }
        self.save().await
    }

    /// Send a typed message to the displayed chat and return the reply
    ///
    /// # Errors
    ///
    /// Returns error if the message is blank or the backend round trip fails
    pub async fn send_text(&self, text: &str) -> Result<String> {
        let utterance =
            Utterance::new(text).ok_or_else(|| Error::Dispatch("message is empty".to_string()))?;
        self.bridge.send(utterance).await
    }

    fn exit_voice(&self) {
        if let Some(voice) = &self.voice {
            if let Err(e) = voice.exit() {
                tracing::debug!(error = %e, "voice controller not running");
            }
        }
    }
}
