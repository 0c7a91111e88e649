//! Chat list, persistence and dispatch bridge tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeBackend, MemoryStore};
use talkback::chat::{Chat, ChatBackend, ChatList, ChatStore, JsonFileStore, Message, Sender};
use talkback::voice::{DispatchBridge, Utterance};
use talkback::{ChatApp, Error};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

fn sample_chat(title: &str) -> Chat {
    Chat {
        id: Uuid::new_v4(),
        title: title.to_string(),
        messages: vec![Message::user("hi"), Message::ai("hello")],
    }
}

#[tokio::test]
async fn test_json_store_persists_chats() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("chats.json");
    let store = JsonFileStore::new(&path);

    let chats = vec![sample_chat("Groceries"), sample_chat("Trip")];
    store.save_chats(&chats).await.unwrap();

    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());

    let loaded = store.load_chats().await.unwrap();
    assert_eq!(loaded, chats);
}

#[tokio::test]
async fn test_json_store_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("chats.json"));

    assert!(store.load_chats().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_json_store_rejects_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chats.json");
    std::fs::write(&path, "not json").unwrap();

    let result = JsonFileStore::new(&path).load_chats().await;
    assert!(matches!(result, Err(Error::Serialization(_))));
}

#[tokio::test]
async fn test_bridge_records_user_message_and_reply() {
    let chats = ChatList::new().into_shared();
    let backend = FakeBackend::replying("four");
    let bridge = DispatchBridge::new(Arc::clone(&chats), backend.clone(), None);

    let reply = bridge
        .send(Utterance::new("  what is two plus two ").unwrap())
        .await
        .unwrap();

    assert_eq!(reply, "four");
    assert_eq!(backend.calls(), vec!["what is two plus two".to_string()]);

    let list = chats.read().await;
    assert_eq!(list.len(), 1);
    let chat = list.current().unwrap();
    assert_eq!(chat.title, "New Chat 1");
    let senders: Vec<Sender> = chat.messages.iter().map(|m| m.sender).collect();
    assert_eq!(senders, vec![Sender::User, Sender::Ai]);
}

#[tokio::test]
async fn test_bridge_failure_removes_only_its_message() {
    let mut list = ChatList::new();
    let id = list.create_chat();
    list.push_message(id, Message::user("earlier")).unwrap();
    list.push_message(id, Message::ai("answer")).unwrap();
    let chats = list.into_shared();

    let store = MemoryStore::with_chats(Vec::new());
    let bridge = DispatchBridge::new(
        Arc::clone(&chats),
        FakeBackend::failing("timeout"),
        Some(store.clone() as Arc<dyn ChatStore>),
    );

    let result = bridge.send(Utterance::new("lost message").unwrap()).await;
    assert!(matches!(result, Err(Error::Dispatch(_))));

    let list = chats.read().await;
    let contents: Vec<&str> = list
        .current()
        .unwrap()
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["earlier", "answer"]);

    // Rolled-back state is what gets saved
    assert_eq!(store.saved()[0].messages.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reply_for_deleted_chat_is_dropped() {
    let chats = ChatList::new().into_shared();
    let backend = FakeBackend::scripted([Ok("too late".to_string())], Duration::from_millis(50));
    let bridge = DispatchBridge::new(Arc::clone(&chats), backend, None);

    let pending = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.send(Utterance::new("hello").unwrap()).await }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    let id = chats.read().await.current_id().unwrap();
    chats.write().await.delete(id).unwrap();

    assert_eq!(pending.await.unwrap().unwrap(), "too late");
    assert!(chats.read().await.is_empty());
}

#[tokio::test]
async fn test_app_load_and_new_chat_titles() {
    let store = MemoryStore::with_chats(vec![sample_chat("Old")]);
    let app = ChatApp::new(
        store.clone() as Arc<dyn ChatStore>,
        FakeBackend::replying("ok") as Arc<dyn ChatBackend>,
    );

    assert_eq!(app.load().await.unwrap(), 1);
    assert!(app.current().await.is_none());

    let id = app.new_chat().await.unwrap();
    let current = app.current().await.unwrap();
    assert_eq!(current.id, id);
    assert_eq!(current.title, "New Chat 2");

    let listed: Vec<String> = app.list().await.into_iter().map(|c| c.title).collect();
    assert_eq!(listed, vec!["New Chat 2".to_string(), "Old".to_string()]);
    assert_eq!(store.saved().len(), 2);
}

#[tokio::test]
async fn test_app_rename_and_delete() {
    let store = MemoryStore::with_chats(Vec::new());
    let app = ChatApp::new(
        store.clone() as Arc<dyn ChatStore>,
        FakeBackend::replying("ok") as Arc<dyn ChatBackend>,
    );
    let id = app.new_chat().await.unwrap();

    assert_ok!(app.rename_chat(id, "Recipes").await);
    assert_eq!(store.saved()[0].title, "Recipes");
    assert_err!(app.rename_chat(id, "   ").await);

    assert_ok!(app.delete_chat(id).await);
    assert!(app.current().await.is_none());
    assert!(store.saved().is_empty());
    assert!(matches!(
        app.delete_chat(id).await,
        Err(Error::ChatNotFound(_))
    ));
}

#[tokio::test]
async fn test_app_select_unknown_chat_fails() {
    let app = ChatApp::new(
        MemoryStore::with_chats(Vec::new()) as Arc<dyn ChatStore>,
        FakeBackend::replying("ok") as Arc<dyn ChatBackend>,
    );

    let result = app.select_chat(Uuid::new_v4()).await;
    assert!(matches!(result, Err(Error::ChatNotFound(_))));
}

#[tokio::test]
async fn test_app_send_text() {
    let backend = FakeBackend::replying("pong");
    let app = ChatApp::new(
        MemoryStore::with_chats(Vec::new()) as Arc<dyn ChatStore>,
        backend.clone() as Arc<dyn ChatBackend>,
    );

    assert_err!(app.send_text("   ").await);
    assert!(backend.calls().is_empty());

    assert_eq!(assert_ok!(app.send_text("ping").await), "pong");
    assert_eq!(app.current().await.unwrap().messages.len(), 2);
}
