//! Shared view of who is signed in.
use std::sync::Arc;

use tokio::sync::watch;

use campaign_core::{Session, UserId};

/// Cloneable handle to the current [`Session`].
///
/// Workers read it once per operation, so a sign-in or sign-out takes effect
/// at the next operation boundary.
#[derive(Clone)]
pub struct SessionHandle {
    tx: Arc<watch::Sender<Session>>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        let (tx, _rx) = watch::channel(session);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn user(&self) -> Option<UserId> {
        self.tx.borrow().user.clone()
    }

    pub fn sign_in(&self, user: UserId) {
        tracing::info!("Signed in as {}", user);
        self.tx.send_replace(Session::signed_in(user));
    }

    pub fn sign_out(&self) {
        tracing::info!("Signed out");
        self.tx.send_replace(Session::signed_out());
    }

    /// Receiver that observes future session changes.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new(Session::signed_out())
    }
}
