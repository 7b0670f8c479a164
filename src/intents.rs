//! User intents against the backend: send, edit, delete, create room.
//! Failures go to the log and are reported back as plain outcomes.

use std::sync::Arc;

use anyhow::Context;
use time::OffsetDateTime;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    backend::{Auth, Backend},
    models::{Message, MessageId, NewMessage, Room, User},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// The message input: text plus an optional file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composer {
    pub draft: String,
    pub attachment: Option<Attachment>,
}

impl Composer {
    pub fn is_empty(&self) -> bool {
        self.draft.trim().is_empty() && self.attachment.is_none()
    }

    pub fn clear(&mut self) {
        self.draft.clear();
        self.attachment = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(Message),
    /// Nothing to send, or nobody signed in.
    Skipped,
    Failed,
}

pub struct Intents {
    backend: Arc<dyn Backend>,
    auth: Arc<dyn Auth>,
    access_token: String,
}

impl Intents {
    pub fn new(
        backend: Arc<dyn Backend>,
        auth: Arc<dyn Auth>,
        access_token: impl Into<String>,
    ) -> Self {
        Self { backend, auth, access_token: access_token.into() }
    }

    /// Uploads the attachment (if any) then inserts the message. The composer
    /// is cleared only when both succeed.
    pub async fn send(&self, room_id: Uuid, composer: &mut Composer) -> SendOutcome {
        if composer.is_empty() {
            return SendOutcome::Skipped;
        }

        let user = match self.auth.get_user(&self.access_token).await {
            Ok(Some(user)) => user,
            Ok(None) => return SendOutcome::Skipped,
            Err(err) => {
                error!("error resolving current user: {err:#}");
                return SendOutcome::Failed;
            }
        };

        match self.try_send(&user, room_id, composer).await {
            Ok(message) => {
                composer.clear();
                SendOutcome::Sent(message)
            }
            Err(err) => {
                error!(%room_id, user_id = %user.id, "error sending message: {err:#}");
                SendOutcome::Failed
            }
        }
    }

    async fn try_send(
        &self,
        user: &User,
        room_id: Uuid,
        composer: &Composer,
    ) -> anyhow::Result<Message> {
        let file_url = match &composer.attachment {
            Some(Attachment { file_name, bytes }) => Some(
                self.backend
                    .upload(user.id, file_name, bytes)
                    .await
                    .context("uploading attachment")?,
            ),
            None => None,
        };

        self.backend
            .insert_message(NewMessage {
                content: composer.draft.clone(),
                user_id: user.id,
                room_id,
                file_url,
            })
            .await
            .context("inserting message")
    }

    /// Ownership is the backend's business; no author check happens here.
    pub async fn edit(&self, id: MessageId, content: &str) -> bool {
        match self.backend.update_message(id, content, OffsetDateTime::now_utc()).await {
            Ok(()) => true,
            Err(err) => {
                error!(id, "error editing message: {err:#}");
                false
            }
        }
    }

    pub async fn delete(&self, id: MessageId) -> bool {
        match self.backend.delete_message(id).await {
            Ok(()) => true,
            Err(err) => {
                error!(id, "error deleting message: {err:#}");
                false
            }
        }
    }

    pub async fn create_room(&self, name: &str) -> Option<Room> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        match self.backend.insert_room(name).await {
            Ok(room) => {
                info!(room_id = %room.id, "room created");
                Some(room)
            }
            Err(err) => {
                error!(name, "error creating room: {err:#}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::backend::fake::FakeBackend;

    fn ann() -> User {
        User { id: Uuid::from_u128(42), email: "ann@example.org".to_owned() }
    }

    fn room() -> Uuid {
        Uuid::from_u128(1)
    }

    fn intents(backend: &Arc<FakeBackend>) -> Intents {
        Intents::new(backend.clone(), backend.clone(), "token")
    }

    fn composer(draft: &str) -> Composer {
        Composer { draft: draft.to_owned(), attachment: None }
    }

    #[tokio::test]
    async fn empty_send_writes_nothing() {
        let backend = Arc::new(FakeBackend::signed_in(ann()));
        let intents = intents(&backend);

        assert_eq!(intents.send(room(), &mut composer("")).await, SendOutcome::Skipped);
        assert_eq!(intents.send(room(), &mut composer("  \n")).await, SendOutcome::Skipped);
        assert!(backend.calls().inserts.is_empty());
        assert!(backend.calls().uploads.is_empty());
    }

    #[tokio::test]
    async fn send_without_user_is_silent_noop() {
        let backend = Arc::new(FakeBackend::new());
        let mut input = composer("hello");

        assert_eq!(intents(&backend).send(room(), &mut input).await, SendOutcome::Skipped);
        assert!(backend.calls().inserts.is_empty());
        assert_eq!(input.draft, "hello");
    }

    #[tokio::test]
    async fn send_inserts_and_clears_input() {
        let backend = Arc::new(FakeBackend::signed_in(ann()));
        let mut input = composer("hello");

        let SendOutcome::Sent(message) = intents(&backend).send(room(), &mut input).await else {
            panic!("expected Sent");
        };
        assert_eq!(message.content, "hello");
        assert_eq!(input, Composer::default());
        assert_eq!(
            backend.calls().inserts,
            [NewMessage {
                content: "hello".to_owned(),
                user_id: ann().id,
                room_id: room(),
                file_url: None,
            }]
        );
    }

    #[tokio::test]
    async fn attachment_is_uploaded_under_user_namespace() {
        let backend = Arc::new(FakeBackend::signed_in(ann()));
        let mut input = Composer {
            draft: String::new(),
            attachment: Some(Attachment { file_name: "cat.png".to_owned(), bytes: vec![1, 2, 3] }),
        };

        let outcome = intents(&backend).send(room(), &mut input).await;
        assert!(matches!(outcome, SendOutcome::Sent(_)));

        let calls = backend.calls();
        assert_eq!(calls.uploads, [(ann().id, "cat.png".to_owned(), vec![1, 2, 3])]);
        let expected = format!("{}/cat.png", ann().id);
        assert_eq!(calls.inserts[0].file_url.as_deref(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn failed_send_keeps_input() {
        let backend = Arc::new(FakeBackend::signed_in(ann()));
        backend.fail_writes.store(true, Ordering::SeqCst);
        let mut input = composer("hello");

        assert_eq!(intents(&backend).send(room(), &mut input).await, SendOutcome::Failed);
        assert_eq!(input.draft, "hello");
    }

    #[tokio::test]
    async fn edit_stamps_edit_time() {
        let backend = Arc::new(FakeBackend::signed_in(ann()));
        let before = OffsetDateTime::now_utc();

        assert!(intents(&backend).edit(3, "fixed").await);

        let calls = backend.calls();
        let (id, content, edited_at) = &calls.updates[0];
        assert_eq!((*id, content.as_str()), (3, "fixed"));
        assert!(*edited_at >= before);
    }

    #[tokio::test]
    async fn delete_and_room_creation() {
        let backend = Arc::new(FakeBackend::signed_in(ann()));
        let intents = intents(&backend);

        assert!(intents.delete(3).await);
        assert!(intents.create_room("   ").await.is_none());
        assert_eq!(intents.create_room(" lobby ").await.unwrap().name, "lobby");

        let calls = backend.calls();
        assert_eq!(calls.deletes, [3]);
        assert_eq!(calls.rooms, ["lobby"]);
    }
}
