use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::backend::Backend;

use super::RoomState;

/// Keeps a [`RoomState`] in step with the backend: one bulk fetch, then the
/// room's change feeds. Every reconciliation is published as a single state
/// replacement on a watch channel.
pub struct RoomSync {
    backend: Arc<dyn Backend>,
    room_id: Uuid,
    state: Arc<watch::Sender<RoomState>>,
    pumps: Vec<JoinHandle<()>>,
}

impl RoomSync {
    pub fn new(backend: Arc<dyn Backend>, room_id: Uuid) -> Self {
        Self {
            backend,
            room_id,
            state: Arc::new(watch::channel(RoomState::default()).0),
            pumps: Vec::new(),
        }
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    pub fn watch(&self) -> watch::Receiver<RoomState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> RoomState {
        self.state.borrow().clone()
    }

    pub fn is_subscribed(&self) -> bool {
        !self.pumps.is_empty()
    }

    /// Bulk-loads the room. On failure the current list is kept and `false` is returned.
    pub async fn initialize(&self) -> bool {
        match self.backend.select_messages(self.room_id).await {
            Ok(messages) => {
                debug!(room_id = %self.room_id, count = messages.len(), "room loaded");
                self.state.send_modify(|state| state.replace(messages));
                true
            }
            Err(err) => {
                error!(room_id = %self.room_id, "error fetching messages: {err:#}");
                false
            }
        }
    }

    /// Opens the message and typing feeds for this room.
    pub fn subscribe(&mut self) {
        if self.is_subscribed() {
            warn!(room_id = %self.room_id, "room already subscribed");
            return;
        }

        let mut messages = self.backend.subscribe_messages(self.room_id);
        let state = self.state.clone();
        self.pumps.push(tokio::spawn(async move {
            while let Some(change) = messages.recv().await {
                state.send_modify(|state| state.apply_message_change(change));
            }
        }));

        let mut typing = self.backend.subscribe_typing(self.room_id);
        let state = self.state.clone();
        self.pumps.push(tokio::spawn(async move {
            while let Some(change) = typing.recv().await {
                state.send_modify(|state| state.apply_typing_change(change));
            }
        }));

        debug!(room_id = %self.room_id, "room subscribed");
    }

    /// Cancels the feeds. Safe to call at any point, any number of times.
    pub fn teardown(&mut self) {
        if self.pumps.is_empty() {
            return;
        }
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
        debug!(room_id = %self.room_id, "room unsubscribed");
    }
}

impl Drop for RoomSync {
    fn drop(&mut self) {
        self.teardown();
    }
}
