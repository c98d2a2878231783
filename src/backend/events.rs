use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use super::Session;

pub const EVENT_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn signed_in(session: Session) -> Self {
        Self { kind: AuthEventKind::SignedIn, session: Some(session) }
    }

    pub fn signed_out() -> Self {
        Self { kind: AuthEventKind::SignedOut, session: None }
    }

    pub fn token_refreshed(session: Session) -> Self {
        Self { kind: AuthEventKind::TokenRefreshed, session: Some(session) }
    }
}

/// Auth-state change notifications. Publishing never blocks and never
/// fails when nobody is listening.
#[derive(Debug, Clone)]
pub struct AuthEvents {
    sender: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            missed: 0,
        }
    }

    pub fn publish(&self, event: AuthEvent) {
        // Err only means there are no subscribers right now
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped subscription; dropping it unsubscribes
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<AuthEvent>,
    missed: u64,
}

impl Subscription {
    /// Next event, or `None` once the publisher is gone. A slow subscriber
    /// skips the events it missed and continues with the oldest retained one;
    /// the skipped count is kept for [`Subscription::take_missed`].
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Auth event subscriber lagged, skipped {} events", skipped);
                    self.missed += skipped;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Events dropped since the last call; resets the count
    pub fn take_missed(&mut self) -> u64 {
        std::mem::take(&mut self.missed)
    }

    pub fn unsubscribe(self) {}
}
