use crate::bridge::SessionBridge;
use crate::client::Connector;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::tools::ToolRegistry;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tracing::{Instrument, error, info, info_span, warn};

/// Accepts client websocket connections and hands each one to its own
/// [`SessionBridge`] task. Sessions share nothing but the tool registry and
/// the connector.
pub struct RelayServer<C> {
    config: Arc<RelayConfig>,
    bridge: SessionBridge<C>,
    next_session_id: AtomicU64,
}

impl<C: Connector> RelayServer<C> {
    pub fn new(config: Arc<RelayConfig>, connector: Arc<C>, registry: Arc<ToolRegistry>) -> Self {
        let bridge = SessionBridge::new(config.clone(), connector, registry);
        Self {
            config,
            bridge,
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from `listener` until `shutdown` resolves. Sessions
    /// already running are left to finish on their own.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()>,
    {
        let local_addr = listener.local_addr()?;
        info!("[Relay] Listening on ws://{}", local_addr);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("[Relay] Shutdown requested; no longer accepting connections.");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.spawn_session(stream, peer),
                        Err(e) => warn!("[Relay] Failed to accept connection: {}", e),
                    }
                }
            }
        }
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let bridge = self.bridge.clone();
        let span = info_span!("session", id = session_id, %peer);

        tokio::spawn(
            async move {
                info!("[Relay] Client connected.");
                let ws_stream = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws_stream) => ws_stream,
                    Err(e) => {
                        error!("[Relay] WebSocket handshake failed: {}", e);
                        return;
                    }
                };
                // Errors are logged by the bridge; the listener carries on.
                let _ = bridge.run(session_id, ws_stream).await;
                info!("[Relay] Client disconnected.");
            }
            .instrument(span),
        );
    }
}
