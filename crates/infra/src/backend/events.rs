//! Session events pushed by an auth backend.
//!
//! Broadcast semantics: every subscription gets every event published after
//! it subscribed. Delivery is best-effort; a lagging subscriber skips what it
//! missed. Consumers must tolerate events that arrive late (after the session
//! they refer to has already ended), which is why events carry the token.

use tokio::sync::broadcast;

use wholesale_auth::SessionToken;

const EVENT_BUFFER: usize = 64;

/// A change in backend session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session was opened for this token outside of the current login flow.
    SignedIn(SessionToken),
    /// A session ended. `None` means "whatever session is current".
    SignedOut(Option<SessionToken>),
}

/// Publisher side, owned by a backend.
#[derive(Debug, Clone)]
pub struct SessionEventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    /// Publish to current subscribers. Having none is fine.
    pub fn publish(&self, event: SessionEvent) {
        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::trace!(delivered, "session event published");
    }

    pub fn subscribe(&self) -> SessionEvents {
        SessionEvents {
            receiver: Some(self.sender.subscribe()),
        }
    }
}

impl Default for SessionEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber side: an explicit stream with an unsubscribe handle.
#[derive(Debug)]
pub struct SessionEvents {
    receiver: Option<broadcast::Receiver<SessionEvent>>,
}

impl SessionEvents {
    /// A stream that is already finished. Used by backends with no push channel.
    pub fn closed() -> Self {
        Self { receiver: None }
    }

    /// Wait for the next event. `None` once unsubscribed or the bus is gone.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "session event subscriber lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// Stop receiving. Later `next()` calls return `None`.
    pub fn unsubscribe(&mut self) {
        self.receiver = None;
    }

    pub fn is_subscribed(&self) -> bool {
        self.receiver.is_some()
    }
}
