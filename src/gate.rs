use tokio::sync::watch;
use tracing::debug;

use crate::{
    backend::Auth,
    models::{Session, User},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Unauthenticated,
    Authenticated(User),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    SignedIn(User),
    /// The view must send the user to the sign-in page.
    SignedOut,
}

/// Admits the chat view only while the auth service reports a session.
/// Holds a single auth-state subscription from mount to unmount.
pub struct SessionGate {
    state: GateState,
    auth_state: Option<watch::Receiver<Option<Session>>>,
}

impl SessionGate {
    pub async fn mount(auth: &dyn Auth, access_token: &str) -> anyhow::Result<Self> {
        let auth_state = auth.on_auth_state_change(access_token).await?;
        Ok(Self {
            state: GateState::Unauthenticated,
            auth_state: Some(auth_state),
        })
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn user(&self) -> Option<&User> {
        match &self.state {
            GateState::Authenticated(user) => Some(user),
            GateState::Unauthenticated => None,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.auth_state.is_some()
    }

    pub fn observe(&mut self, session: Option<&Session>) -> Transition {
        match (session, &self.state) {
            (Some(session), GateState::Authenticated(user)) if *user == session.user => {
                Transition::Unchanged
            }
            (Some(session), _) => {
                debug!(user_id = %session.user.id, "gate open");
                self.state = GateState::Authenticated(session.user.clone());
                Transition::SignedIn(session.user.clone())
            }
            (None, _) => {
                debug!("gate closed");
                self.state = GateState::Unauthenticated;
                Transition::SignedOut
            }
        }
    }

    /// Applies the session reported at subscription time.
    pub fn observe_current(&mut self) -> Transition {
        let Some(auth_state) = self.auth_state.as_mut() else {
            return Transition::Unchanged;
        };
        let session = auth_state.borrow_and_update().clone();
        self.observe(session.as_ref())
    }

    /// Waits for the next auth-state report. `None` once unmounted or the
    /// auth service stops reporting.
    pub async fn changed(&mut self) -> Option<Transition> {
        let auth_state = self.auth_state.as_mut()?;
        auth_state.changed().await.ok()?;
        let session = auth_state.borrow_and_update().clone();
        Some(self.observe(session.as_ref()))
    }

    pub fn unmount(&mut self) {
        self.auth_state = None;
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::backend::fake::FakeBackend;

    fn ann() -> User {
        User { id: Uuid::from_u128(42), email: "ann@example.org".to_owned() }
    }

    fn session(user: User) -> Session {
        Session { access_token: "token".to_owned(), user }
    }

    #[test]
    fn transitions() {
        let mut gate = SessionGate { state: GateState::Unauthenticated, auth_state: None };

        assert_eq!(gate.observe(Some(&session(ann()))), Transition::SignedIn(ann()));
        assert_eq!(gate.observe(Some(&session(ann()))), Transition::Unchanged);
        assert_eq!(gate.user(), Some(&ann()));

        assert_eq!(gate.observe(None), Transition::SignedOut);
        assert_eq!(gate.state(), &GateState::Unauthenticated);
        assert_eq!(gate.observe(None), Transition::SignedOut);
    }

    #[tokio::test]
    async fn follows_auth_notifications_until_unmounted() {
        let backend = FakeBackend::signed_in(ann());
        let mut gate = SessionGate::mount(&backend, "token").await.unwrap();
        assert_eq!(gate.state(), &GateState::Unauthenticated);

        assert_eq!(gate.observe_current(), Transition::SignedIn(ann()));

        backend.auth_state.send_replace(None);
        assert_eq!(gate.changed().await, Some(Transition::SignedOut));
        assert_eq!(gate.user(), None);

        gate.unmount();
        assert!(!gate.is_mounted());
        backend.auth_state.send_replace(Some(session(ann())));
        assert_eq!(gate.changed().await, None);
        assert_eq!(backend.auth_state.receiver_count(), 0);
    }

    #[tokio::test]
    async fn signed_out_at_mount() {
        let backend = FakeBackend::new();
        let mut gate = SessionGate::mount(&backend, "token").await.unwrap();
        assert_eq!(gate.observe_current(), Transition::SignedOut);
    }
}
