//! Chat model and in-memory chat list
//!
//! The chat list is the single source of truth for both the sidebar and the
//! displayed conversation: the displayed chat is looked up by id, so any
//! update to a chat is immediately visible in both.

mod backend;
mod store;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

pub use backend::{ChatBackend, HttpChatBackend};
pub use store::{ChatStore, HttpChatStore, JsonFileStore};

use crate::{Error, Result};

/// Chat identifier
pub type ChatId = Uuid;

/// Message identifier
pub type MessageId = Uuid;

/// Chat list shared between the text UI and the voice controller
pub type SharedChats = Arc<RwLock<ChatList>>;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub sender: Sender,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a user-authored message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(content.into(), Sender::User)
    }

    /// Create an AI-authored message
    #[must_use]
    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(content.into(), Sender::Ai)
    }

    fn new(content: String, sender: Sender) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            sender,
            created_at: Utc::now(),
        }
    }
}

/// A conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Ordered chat list (newest first) plus the currently displayed chat
#[derive(Debug, Default)]
pub struct ChatList {
    chats: Vec<Chat>,
    current: Option<ChatId>,
}

impl ChatList {
    /// Create an empty chat list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chat list from stored chats; nothing is displayed
    #[must_use]
    pub const fn from_chats(chats: Vec<Chat>) -> Self {
        Self {
            chats,
            current: None,
        }
    }

    /// Wrap in a shared handle
    #[must_use]
    pub fn into_shared(self) -> SharedChats {
        Arc::new(RwLock::new(self))
    }

    /// All chats, newest first
    #[must_use]
    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    /// Number of chats
    #[must_use]
    pub fn len(&self) -> usize {
        self.chats.len()
    }

    /// Whether there are no chats
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    /// Id of the displayed chat
    #[must_use]
    pub const fn current_id(&self) -> Option<ChatId> {
        self.current
    }

    /// The displayed chat
    #[must_use]
    pub fn current(&self) -> Option<&Chat> {
        self.current.and_then(|id| self.get(id))
    }

    /// Look up a chat by id
    #[must_use]
    pub fn get(&self, id: ChatId) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: ChatId) -> Option<&mut Chat> {
        self.chats.iter_mut().find(|c| c.id == id)
    }

    /// Create a chat titled `New Chat {n}`, prepend it and display it
    pub fn create_chat(&mut self) -> ChatId {
        let chat = Chat {
            id: Uuid::new_v4(),
            title: format!("New Chat {}", self.chats.len() + 1),
            messages: Vec::new(),
        };
        let id = chat.id;
        self.chats.insert(0, chat);
        self.current = Some(id);
        tracing::debug!(chat_id = %id, "created chat");
        id
    }

    /// The displayed chat, creating one when nothing is displayed
    pub fn current_or_create(&mut self) -> ChatId {
        match self.current.filter(|id| self.get(*id).is_some()) {
            Some(id) => id,
            None => self.create_chat(),
        }
    }

    /// Display a chat
    ///
    /// # Errors
    ///
    /// Returns error if the chat does not exist
    pub fn select(&mut self, id: ChatId) -> Result<()> {
        if self.get(id).is_none() {
            return Err(Error::ChatNotFound(id.to_string()));
        }
        self.current = Some(id);
        Ok(())
    }

    /// Rename a chat
    ///
    /// # Errors
    ///
    /// Returns error if the chat does not exist
    pub fn rename(&mut self, id: ChatId, title: impl Into<String>) -> Result<()> {
        let chat = self
            .get_mut(id)
            .ok_or_else(|| Error::ChatNotFound(id.to_string()))?;
        chat.title = title.into();
        Ok(())
    }

    /// Delete a chat
    ///
    /// Returns true when the deleted chat was the displayed one.
    ///
    /// # Errors
    ///
    /// Returns error if the chat does not exist
    pub fn delete(&mut self, id: ChatId) -> Result<bool> {
        let before = self.chats.len();
        self.chats.retain(|c| c.id != id);
        if self.chats.len() == before {
            return Err(Error::ChatNotFound(id.to_string()));
        }
        let was_current = self.current == Some(id);
        if was_current {
            self.current = None;
        }
        Ok(was_current)
    }

    /// Append a message to a chat
    ///
    /// # Errors
    ///
    /// Returns error if the chat does not exist
    pub fn push_message(&mut self, chat_id: ChatId, message: Message) -> Result<MessageId> {
        let chat = self
            .get_mut(chat_id)
            .ok_or_else(|| Error::ChatNotFound(chat_id.to_string()))?;
        let id = message.id;
        chat.messages.push(message);
        Ok(id)
    }

    /// Remove a message by identity; returns whether it was present
    pub fn remove_message(&mut self, chat_id: ChatId, message_id: MessageId) -> bool {
        let Some(chat) = self.get_mut(chat_id) else {
            return false;
        };
        let before = chat.messages.len();
        chat.messages.retain(|m| m.id != message_id);
        chat.messages.len() != before
    }

    /// Replace all chats (e.g. after loading from a store), keeping the
    /// displayed chat if it still exists
    pub fn replace_all(&mut self, chats: Vec<Chat>) {
        self.chats = chats;
        if self.current.is_some_and(|id| self.get(id).is_none()) {
            self.current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_chat_prepends_and_displays() {
        let mut list = ChatList::new();
        let first = list.create_chat();
        let second = list.create_chat();

        assert_eq!(list.len(), 2);
        assert_eq!(list.chats()[0].id, second);
        assert_eq!(list.chats()[0].title, "New Chat 2");
        assert_eq!(list.chats()[1].title, "New Chat 1");
        assert_eq!(list.current_id(), Some(second));
        assert_ne!(first, second);
    }

    #[test]
    fn test_current_or_create_reuses_displayed() {
        let mut list = ChatList::new();
        let id = list.current_or_create();
        assert_eq!(list.current_or_create(), id);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_delete_current_clears_display() {
        let mut list = ChatList::new();
        let keep = list.create_chat();
        let gone = list.create_chat();

        assert!(list.delete(gone).unwrap());
        assert!(list.current().is_none());
        assert!(!list.delete(keep).unwrap());
        assert!(list.is_empty());
        assert!(list.delete(gone).is_err());
    }

    #[test]
    fn test_remove_message_by_identity() {
        let mut list = ChatList::new();
        let chat = list.create_chat();
        let a = list.push_message(chat, Message::user("same")).unwrap();
        let b = list.push_message(chat, Message::user("same")).unwrap();

        assert!(list.remove_message(chat, a));
        let remaining = &list.get(chat).unwrap().messages;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b);
        assert!(!list.remove_message(chat, a));
    }

    #[test]
    fn test_rename_and_select() {
        let mut list = ChatList::new();
        let a = list.create_chat();
        let _b = list.create_chat();

        list.rename(a, "Groceries").unwrap();
        list.select(a).unwrap();
        assert_eq!(list.current().unwrap().title, "Groceries");
        assert!(list.select(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_sender_serializes_lowercase() {
        let json = serde_json::to_string(&Message::ai("hi")).unwrap();
        assert!(json.contains(r#""sender":"ai""#));
    }

    #[test]
    fn test_replace_all_drops_missing_current() {
        let mut list = ChatList::new();
        list.create_chat();
        list.replace_all(Vec::new());
        assert!(list.current_id().is_none());
    }
}
