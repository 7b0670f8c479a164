use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tracing::{debug, error};

use crate::{backend::Backend, models::TypingIndicator};

pub const DEFAULT_TYPING_LEASE: Duration = Duration::from_millis(3000);

/// Fixed-length typing lease. The first call inserts the indicator row and
/// schedules its deletion after `lease`; calls made while the lease is held
/// do nothing. Keystrokes never extend a running lease.
pub struct TypingLease {
    backend: Arc<dyn Backend>,
    lease: Duration,
    active: Arc<AtomicBool>,
}

impl TypingLease {
    pub fn new(backend: Arc<dyn Backend>, lease: Duration) -> Self {
        Self {
            backend,
            lease,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns whether this call took a new lease.
    ///
    /// Unlike a lease that always deletes after its length, a failed insert
    /// releases the flag at once and schedules no delete.
    pub async fn set_typing(&self, indicator: TypingIndicator) -> bool {
        if self.active.swap(true, Ordering::SeqCst) {
            return false;
        }

        if let Err(err) = self.backend.insert_typing(indicator).await {
            error!(
                user_id = %indicator.user_id,
                room_id = %indicator.room_id,
                "error setting typing indicator: {err:#}"
            );
            self.active.store(false, Ordering::SeqCst);
            return false;
        }

        let backend = self.backend.clone();
        let active = self.active.clone();
        let lease = self.lease;
        tokio::spawn(async move {
            tokio::time::sleep(lease).await;
            if let Err(err) = backend.delete_typing(indicator).await {
                error!(
                    user_id = %indicator.user_id,
                    room_id = %indicator.room_id,
                    "error clearing typing indicator: {err:#}"
                );
            }
            active.store(false, Ordering::SeqCst);
            debug!(user_id = %indicator.user_id, "typing lease expired");
        });

        true
    }
}
