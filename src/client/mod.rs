pub mod builder;
pub mod connection;
pub mod handle;

pub use builder::SetupBuilder;
pub use connection::GeminiConnector;
pub use handle::LiveSessionHandle;

use crate::error::RelayError;
use crate::types::{ClientMessagePayload, RemoteEvent};
use serde_json::Value;
use std::future::Future;
use tokio::sync::{mpsc, oneshot};

/// Capacity of the channels between a session and its connection task.
pub(crate) const SESSION_CHANNEL_CAPACITY: usize = 100;

/// An open remote session: a handle for sending plus the ordered stream of
/// events the model produces. The stream ends when the remote side closes.
pub struct LiveSession {
    pub handle: LiveSessionHandle,
    pub events: mpsc::Receiver<Result<RemoteEvent, RelayError>>,
}

impl LiveSession {
    /// Assembles a session from raw channels. Connectors own the other ends:
    /// they drain `outgoing`, feed `events` and stop when `shutdown` fires.
    pub fn new(
        outgoing: mpsc::Sender<ClientMessagePayload>,
        events: mpsc::Receiver<Result<RemoteEvent, RelayError>>,
        shutdown: oneshot::Sender<()>,
    ) -> Self {
        Self {
            handle: LiveSessionHandle::new(outgoing, shutdown),
            events,
        }
    }
}

/// Opens remote sessions from a fully merged setup configuration.
pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        setup: Value,
    ) -> impl Future<Output = Result<LiveSession, RelayError>> + Send;
}
