use crate::client::LiveSessionHandle;
use futures_util::{Sink, SinkExt};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

/// Upper bound for the closing handshake with the client.
const CLIENT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    AwaitingSetup = 0,
    Connecting = 1,
    Active = 2,
    Closing = 3,
    Closed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::AwaitingSetup,
            1 => SessionState::Connecting,
            2 => SessionState::Active,
            3 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// Lifecycle flag. Only ever moves forward.
#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    fn new() -> Self {
        Self(AtomicU8::new(SessionState::AwaitingSetup as u8))
    }

    pub(crate) fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Moves to `next` unless the session is already at or past it.
    pub(crate) fn advance(&self, next: SessionState) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < next as u8).then_some(next as u8)
            })
            .is_ok()
    }
}

/// One client connection paired with (at most) one remote session.
pub struct Session<Si> {
    id: u64,
    lifecycle: Lifecycle,
    pub(crate) client_sink: Si,
    pub(crate) remote: Option<LiveSessionHandle>,
}

impl<Si> Session<Si>
where
    Si: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    pub fn new(id: u64, client_sink: Si) -> Self {
        Self {
            id,
            lifecycle: Lifecycle::new(),
            client_sink,
            remote: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.get()
    }

    pub(crate) fn advance(&self, next: SessionState) -> bool {
        let moved = self.lifecycle.advance(next);
        if moved {
            debug!("[Bridge] Session {} -> {:?}", self.id, next);
        }
        moved
    }

    pub(crate) fn attach_remote(&mut self, remote: LiveSessionHandle) {
        self.remote = Some(remote);
    }

    /// Releases both sides. Only the first call does any work; later calls
    /// return `false` without touching either connection.
    pub async fn close(&mut self) -> bool {
        if !self.lifecycle.advance(SessionState::Closing) {
            debug!("[Bridge] Session {} already closing or closed.", self.id);
            return false;
        }
        info!("[Bridge] Closing session {}.", self.id);

        if let Some(mut remote) = self.remote.take() {
            remote.close();
        }

        match tokio::time::timeout(CLIENT_CLOSE_TIMEOUT, self.client_sink.close()).await {
            Ok(Ok(())) => debug!("[Bridge] Client connection closed for session {}.", self.id),
            Ok(Err(e)) => debug!(
                "[Bridge] Client connection for session {} already gone: {}",
                self.id, e
            ),
            Err(_) => warn!(
                "[Bridge] Timed out closing client connection for session {}.",
                self.id
            ),
        }

        self.lifecycle.advance(SessionState::Closed);
        info!("[Bridge] Session {} closed.", self.id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_only_moves_forward() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.get(), SessionState::AwaitingSetup);
        assert!(lifecycle.advance(SessionState::Connecting));
        assert!(lifecycle.advance(SessionState::Active));
        assert!(!lifecycle.advance(SessionState::Connecting));
        assert!(lifecycle.advance(SessionState::Closing));
        assert!(!lifecycle.advance(SessionState::Closing));
        assert!(lifecycle.advance(SessionState::Closed));
        assert!(!lifecycle.advance(SessionState::Closing));
        assert_eq!(lifecycle.get(), SessionState::Closed);
    }

    #[test]
    fn test_closing_may_skip_intermediate_states() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.advance(SessionState::Closing));
        assert_eq!(lifecycle.get(), SessionState::Closing);
    }
}
