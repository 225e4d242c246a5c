//! Session bridge: one remote session per client connection.
//!
//! ```text
//! AwaitingSetup -> Connecting -> Active -> Closing -> Closed
//!       \______________\___________________/
//!          (any failure goes straight to Closing)
//! ```
//!
//! While `Active`, two pumps run concurrently inside one `select!`: client to
//! remote, and remote to client (with tool-call interception). Whichever
//! finishes first drops the other, and the session is then torn down.

mod pumps;
mod session;

pub use session::{Session, SessionState};

use crate::client::{Connector, LiveSession, SetupBuilder};
use crate::codec::{self, ClientFrame};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::tools::ToolRegistry;
use futures_util::{Sink, Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{error, info, warn};

pub struct SessionBridge<C> {
    config: Arc<RelayConfig>,
    connector: Arc<C>,
    registry: Arc<ToolRegistry>,
}

impl<C> Clone for SessionBridge<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            connector: self.connector.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<C: Connector> SessionBridge<C> {
    pub fn new(config: Arc<RelayConfig>, connector: Arc<C>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            config,
            connector,
            registry,
        }
    }

    /// Drives one client connection from setup to teardown. Both sides are
    /// released on every exit path.
    pub async fn run<S>(&self, session_id: u64, client: S) -> Result<(), RelayError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>>
            + Sink<Message, Error = tungstenite::Error>
            + Unpin
            + Send,
    {
        let (client_sink, mut client_stream) = client.split();
        let mut session = Session::new(session_id, client_sink);

        let result = self.drive(&mut session, &mut client_stream).await;
        match &result {
            Ok(()) => info!("[Bridge] Session {} finished.", session_id),
            Err(e) => error!("[Bridge] Session {} ended with error: {}", session_id, e),
        }

        session.close().await;
        result
    }

    async fn drive<Si, St>(
        &self,
        session: &mut Session<Si>,
        client_stream: &mut St,
    ) -> Result<(), RelayError>
    where
        Si: Sink<Message, Error = tungstenite::Error> + Unpin,
        St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        let client_config = self.await_setup(client_stream).await?;

        session.advance(SessionState::Connecting);
        let setup = self.build_setup(client_config)?;
        let LiveSession { handle, mut events } = self.connector.connect(setup).await?;
        session.attach_remote(handle);
        session.advance(SessionState::Active);
        info!("[Bridge] Session {} connected to remote.", session.id());

        let Session {
            client_sink,
            remote,
            ..
        } = session;
        let Some(remote) = remote.as_ref() else {
            return Err(RelayError::NotReady);
        };

        tokio::select! {
            result = pumps::client_to_remote(client_stream, remote) => {
                info!("[Bridge] Upstream pump finished; cancelling downstream.");
                result
            }
            result = pumps::remote_to_client(&mut events, client_sink, remote, &self.registry) => {
                info!("[Bridge] Downstream pump finished; cancelling upstream.");
                result
            }
        }
    }

    /// Waits for the client's first data frame, which must be a setup frame.
    async fn await_setup<St>(&self, client_stream: &mut St) -> Result<Value, RelayError>
    where
        St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        let first_frame = async {
            while let Some(message) = client_stream.next().await {
                let message = message.map_err(|e| {
                    RelayError::Protocol(format!("client connection failed before setup: {}", e))
                })?;
                let decoded = match &message {
                    Message::Text(text) => codec::decode_client_frame(text.as_bytes()),
                    Message::Binary(data) => codec::decode_client_frame(data),
                    Message::Close(_) => break,
                    _ => continue,
                };
                return match decoded {
                    Ok(ClientFrame::Setup(config)) => Ok(config),
                    Ok(ClientFrame::RealtimeInput(_)) => Err(RelayError::Protocol(
                        "expected setup frame, got realtime_input".to_string(),
                    )),
                    Err(e) => Err(RelayError::Protocol(format!("invalid setup frame: {}", e))),
                };
            }
            Err(RelayError::Protocol(
                "client disconnected before setup".to_string(),
            ))
        };

        match tokio::time::timeout(self.config.setup_timeout, first_frame).await {
            Ok(result) => result,
            Err(_) => {
                warn!("[Bridge] No setup frame within {:?}.", self.config.setup_timeout);
                Err(RelayError::Protocol(format!(
                    "no setup frame within {:?}",
                    self.config.setup_timeout
                )))
            }
        }
    }

    fn build_setup(&self, client_config: Value) -> Result<Value, RelayError> {
        let mut builder = SetupBuilder::from_client_config(client_config)?.model(&self.config.model);
        if self.config.strip_response_modalities {
            builder = builder.strip_response_modalities();
        }
        Ok(builder
            .add_tool_declarations(self.registry.declarations())
            .build())
    }
}
