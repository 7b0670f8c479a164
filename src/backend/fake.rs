//! Recording backend for unit tests. Writes are logged, never published;
//! tests drive the change feeds by hand.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicI64, Ordering},
};

use anyhow::bail;
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::{
    Message, MessageId, NewMessage, Room, Session, TypingIndicator, User, from_millis,
};

use super::{Auth, AuthError, Backend, ChangeFeed, MessageChange, Subscription, TypingChange};

#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub(crate) inserts: Vec<NewMessage>,
    pub(crate) updates: Vec<(MessageId, String, OffsetDateTime)>,
    pub(crate) deletes: Vec<MessageId>,
    pub(crate) rooms: Vec<String>,
    pub(crate) typing_inserts: Vec<TypingIndicator>,
    pub(crate) typing_deletes: Vec<TypingIndicator>,
    pub(crate) uploads: Vec<(Uuid, String, Vec<u8>)>,
}

pub(crate) struct FakeBackend {
    pub(crate) rows: Mutex<Vec<Message>>,
    pub(crate) calls: Mutex<Calls>,
    pub(crate) fail_reads: AtomicBool,
    pub(crate) fail_writes: AtomicBool,
    pub(crate) messages: ChangeFeed<MessageChange>,
    pub(crate) typing: ChangeFeed<TypingChange>,
    pub(crate) auth_state: watch::Sender<Option<Session>>,
    next_id: AtomicI64,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            calls: Mutex::new(Calls::default()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            messages: ChangeFeed::new(64),
            typing: ChangeFeed::new(64),
            auth_state: watch::channel(None).0,
            next_id: AtomicI64::new(100),
        }
    }

    pub(crate) fn signed_in(user: User) -> Self {
        let backend = Self::new();
        backend.auth_state.send_replace(Some(Session { access_token: "token".to_owned(), user }));
        backend
    }

    pub(crate) fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap()
    }

    fn check_writes(&self) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("backend unavailable");
        }
        Ok(())
    }
}

pub(crate) fn message(id: MessageId, ts: i64, room_id: Uuid) -> Message {
    Message {
        id,
        content: format!("message {id}"),
        user_id: Uuid::nil(),
        room_id,
        created_at: from_millis(ts).unwrap(),
        edited_at: None,
        file_url: None,
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn select_messages(&self, room_id: Uuid) -> anyhow::Result<Vec<Message>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("backend unavailable");
        }
        Ok(self.rows.lock().unwrap().iter().filter(|m| m.room_id == room_id).cloned().collect())
    }

    async fn insert_message(&self, message: NewMessage) -> anyhow::Result<Message> {
        self.check_writes()?;
        self.calls().inserts.push(message.clone());
        Ok(Message {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            content: message.content,
            user_id: message.user_id,
            room_id: message.room_id,
            created_at: OffsetDateTime::now_utc(),
            edited_at: None,
            file_url: message.file_url,
        })
    }

    async fn update_message(
        &self,
        id: MessageId,
        content: &str,
        edited_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        self.check_writes()?;
        self.calls().updates.push((id, content.to_owned(), edited_at));
        Ok(())
    }

    async fn delete_message(&self, id: MessageId) -> anyhow::Result<()> {
        self.check_writes()?;
        self.calls().deletes.push(id);
        Ok(())
    }

    async fn insert_room(&self, name: &str) -> anyhow::Result<Room> {
        self.check_writes()?;
        self.calls().rooms.push(name.to_owned());
        Ok(Room { id: Uuid::now_v7(), name: name.to_owned() })
    }

    async fn select_rooms(&self) -> anyhow::Result<Vec<Room>> {
        Ok(Vec::new())
    }

    async fn select_room(&self, _id: Uuid) -> anyhow::Result<Option<Room>> {
        Ok(None)
    }

    async fn insert_typing(&self, indicator: TypingIndicator) -> anyhow::Result<()> {
        self.check_writes()?;
        self.calls().typing_inserts.push(indicator);
        Ok(())
    }

    async fn delete_typing(&self, indicator: TypingIndicator) -> anyhow::Result<()> {
        self.check_writes()?;
        self.calls().typing_deletes.push(indicator);
        Ok(())
    }

    async fn upload(&self, user_id: Uuid, file_name: &str, bytes: &[u8]) -> anyhow::Result<String> {
        self.check_writes()?;
        self.calls().uploads.push((user_id, file_name.to_owned(), bytes.to_vec()));
        Ok(format!("{user_id}/{file_name}"))
    }

    fn subscribe_messages(&self, room_id: Uuid) -> Subscription<MessageChange> {
        self.messages.subscribe(room_id)
    }

    fn subscribe_typing(&self, room_id: Uuid) -> Subscription<TypingChange> {
        self.typing.subscribe(room_id)
    }
}

#[async_trait]
impl Auth for FakeBackend {
    async fn sign_up(&self, _email: &str, _password: &str) -> Result<User, AuthError> {
        Err(AuthError::InvalidEmail)
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<Session, AuthError> {
        Err(AuthError::InvalidCredentials)
    }

    async fn sign_out(&self, _access_token: &str) -> anyhow::Result<()> {
        self.auth_state.send_replace(None);
        Ok(())
    }

    async fn get_user(&self, _access_token: &str) -> anyhow::Result<Option<User>> {
        Ok(self.auth_state.borrow().as_ref().map(|session| session.user.clone()))
    }

    async fn on_auth_state_change(
        &self,
        _access_token: &str,
    ) -> anyhow::Result<watch::Receiver<Option<Session>>> {
        Ok(self.auth_state.subscribe())
    }
}
