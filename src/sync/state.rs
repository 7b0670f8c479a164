use uuid::Uuid;

use crate::{
    backend::{MessageChange, TypingChange},
    models::Message,
};

/// Client-side projection of one room: messages newest first plus who is typing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomState {
    pub messages: Vec<Message>,
    /// May hold the same user twice if two inserts land before a delete.
    pub typing: Vec<Uuid>,
}

impl RoomState {
    /// Replaces the list wholesale with a bulk fetch, sorted by creation time, newest first.
    pub fn replace(&mut self, mut messages: Vec<Message>) {
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        self.messages = messages;
    }

    /// Inserts are prepended as they arrive; they are never re-sorted.
    pub fn apply_message_change(&mut self, change: MessageChange) {
        match change {
            MessageChange::Insert(message) => self.messages.insert(0, message),
            MessageChange::Update(message) => {
                if let Some(slot) = self.messages.iter_mut().find(|m| m.id == message.id) {
                    *slot = message;
                }
            }
            MessageChange::Delete { id, .. } => self.messages.retain(|m| m.id != id),
        }
    }

    pub fn apply_typing_change(&mut self, change: TypingChange) {
        match change {
            TypingChange::Insert(indicator) => self.typing.push(indicator.user_id),
            TypingChange::Delete(indicator) => self.typing.retain(|id| *id != indicator.user_id),
        }
    }
}
