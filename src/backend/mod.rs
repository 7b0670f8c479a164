//! The hosted-service seam: everything the chat needs from persistence,
//! identity, file storage, and change notification goes through the
//! [`Backend`] and [`Auth`] traits.

pub mod auth;
pub mod sqlite;
pub mod storage;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{broadcast, watch};
use tracing::warn;
use uuid::Uuid;

use crate::models::{Message, MessageId, NewMessage, Room, Session, TypingIndicator, User};

pub use auth::AuthError;
pub use sqlite::SqliteBackend;

/// Row-level notification from the `messages` collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageChange {
    Insert(Message),
    Update(Message),
    Delete { id: MessageId, room_id: Uuid },
}

/// Row-level notification from the `typing_indicators` collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingChange {
    Insert(TypingIndicator),
    Delete(TypingIndicator),
}

pub trait RoomScoped {
    fn room_id(&self) -> Uuid;
}

impl RoomScoped for MessageChange {
    fn room_id(&self) -> Uuid {
        match self {
            MessageChange::Insert(m) | MessageChange::Update(m) => m.room_id,
            MessageChange::Delete { room_id, .. } => *room_id,
        }
    }
}

impl RoomScoped for TypingChange {
    fn room_id(&self) -> Uuid {
        match self {
            TypingChange::Insert(t) | TypingChange::Delete(t) => t.room_id,
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// All messages of a room, newest first.
    async fn select_messages(&self, room_id: Uuid) -> anyhow::Result<Vec<Message>>;
    async fn insert_message(&self, message: NewMessage) -> anyhow::Result<Message>;
    async fn update_message(
        &self,
        id: MessageId,
        content: &str,
        edited_at: OffsetDateTime,
    ) -> anyhow::Result<()>;
    async fn delete_message(&self, id: MessageId) -> anyhow::Result<()>;

    async fn insert_room(&self, name: &str) -> anyhow::Result<Room>;
    async fn select_rooms(&self) -> anyhow::Result<Vec<Room>>;
    async fn select_room(&self, id: Uuid) -> anyhow::Result<Option<Room>>;

    async fn insert_typing(&self, indicator: TypingIndicator) -> anyhow::Result<()>;
    async fn delete_typing(&self, indicator: TypingIndicator) -> anyhow::Result<()>;

    /// Stores `bytes` at `{user_id}/{file_name}` and returns that path.
    async fn upload(&self, user_id: Uuid, file_name: &str, bytes: &[u8]) -> anyhow::Result<String>;

    fn subscribe_messages(&self, room_id: Uuid) -> Subscription<MessageChange>;
    fn subscribe_typing(&self, room_id: Uuid) -> Subscription<TypingChange>;
}

#[async_trait]
pub trait Auth: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;
    async fn sign_out(&self, access_token: &str) -> anyhow::Result<()>;
    async fn get_user(&self, access_token: &str) -> anyhow::Result<Option<User>>;
    /// Current session for `access_token`, followed by every later change to it.
    async fn on_auth_state_change(
        &self,
        access_token: &str,
    ) -> anyhow::Result<watch::Receiver<Option<Session>>>;
}

/// Fan-out of one collection's change notifications.
pub struct ChangeFeed<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone + RoomScoped> ChangeFeed<T> {
    pub fn new(capacity: usize) -> Self {
        Self { tx: broadcast::channel(capacity).0 }
    }

    pub fn publish(&self, change: T) {
        // nobody listening is fine
        let _ = self.tx.send(change);
    }

    pub fn subscribe(&self, room_id: Uuid) -> Subscription<T> {
        Subscription { room_id, rx: self.tx.subscribe() }
    }
}

/// A change feed narrowed to one room.
pub struct Subscription<T> {
    room_id: Uuid,
    rx: broadcast::Receiver<T>,
}

impl<T: Clone + RoomScoped> Subscription<T> {
    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    /// Next notification for this room, or `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.room_id() == self.room_id => return Some(change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        room_id = %self.room_id,
                        skipped,
                        "change feed lagged, notifications dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
