//! Identity binding coordinator.
//!
//! The session subsystem decides *when* notifications should flow; this
//! module turns its lifecycle events into bind/unbind calls on the
//! [`ConnectionManager`]. UI code never calls it directly.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::notification::ConnectionBinding;

/// Identity lifecycle signal from the session subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    /// A user signed in (or the session was restored).
    SignedIn {
        /// Signed-in user id.
        user_id: u64,
        /// Role the user acts as.
        user_role: String,
    },
    /// The user signed out.
    SignedOut,
    /// The session could not be verified (expired, revoked).
    VerificationFailed,
}

/// Translates identity events into connection bindings.
#[derive(Debug, Clone)]
pub struct IdentityCoordinator {
    connections: Arc<ConnectionManager>,
}

impl IdentityCoordinator {
    /// Coordinate bindings on `connections`.
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    /// Bind notifications to `(user_id, user_role)`.
    ///
    /// No-op if that identity is already bound; otherwise replaces the
    /// current binding.
    pub fn bind(&self, user_id: u64, user_role: &str) -> Result<()> {
        self.connections
            .bind(ConnectionBinding::new(user_id, user_role))
    }

    /// Drop the current binding. Idempotent.
    pub fn unbind(&self) {
        self.connections.unbind();
    }

    /// Apply one identity event.
    ///
    /// Bind failures are logged, not returned: identity transitions must
    /// not fail because the notification channel could not be opened.
    pub fn handle(&self, event: IdentityEvent) {
        match event {
            IdentityEvent::SignedIn { user_id, user_role } => {
                if let Err(e) = self.bind(user_id, &user_role) {
                    log::error!(
                        "[Identity] Could not bind notifications for {}#{}: {}",
                        user_role,
                        user_id,
                        e
                    );
                }
            }
            IdentityEvent::SignedOut => {
                log::info!("[Identity] Signed out, unbinding notifications");
                self.unbind();
            }
            IdentityEvent::VerificationFailed => {
                log::warn!("[Identity] Session verification failed, unbinding notifications");
                self.unbind();
            }
        }
    }

    /// Apply identity events until the sender side closes.
    pub async fn run(self, mut events: mpsc::Receiver<IdentityEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        log::debug!("[Identity] Event stream closed");
    }
}
