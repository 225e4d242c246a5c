use crate::codec::MediaChunk;
use crate::error::RelayError;
use crate::types::{
    BidiGenerateContentRealtimeInput, BidiGenerateContentToolResponse, ClientMessagePayload,
    FunctionResponse,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

/// Send side of one remote session.
///
/// Outgoing payloads go through an mpsc channel to the connection task that
/// owns the websocket; `close` (or dropping the handle) tells that task to
/// shut the connection down.
pub struct LiveSessionHandle {
    pub(crate) shutdown_tx: Option<oneshot::Sender<()>>,
    pub(crate) outgoing_sender: Option<mpsc::Sender<ClientMessagePayload>>,
}

impl LiveSessionHandle {
    pub fn new(
        outgoing_sender: mpsc::Sender<ClientMessagePayload>,
        shutdown_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            shutdown_tx: Some(shutdown_tx),
            outgoing_sender: Some(outgoing_sender),
        }
    }

    /// Signals the connection task and drops the outgoing sender. Returns
    /// `false` when the handle was already closed.
    pub fn close(&mut self) -> bool {
        let Some(tx) = self.shutdown_tx.take() else {
            return false;
        };
        info!("[SessionHandle] Close requested.");
        if tx.send(()).is_err() {
            info!("[SessionHandle] Shutdown signal failed: connection task already gone.");
        } else {
            info!("[SessionHandle] Shutdown signal sent to connection task.");
        }
        self.outgoing_sender.take();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown_tx.is_none()
    }

    async fn send_message(&self, payload: ClientMessagePayload) -> Result<(), RelayError> {
        let Some(sender) = &self.outgoing_sender else {
            error!("[SessionHandle] Cannot send message: session is closed.");
            return Err(RelayError::NotReady);
        };
        sender.send(payload).await.map_err(|e| {
            error!(
                "[SessionHandle] Failed to hand message to connection task: channel closed. Error: {}",
                e
            );
            RelayError::RemoteStream("remote session channel closed".to_string())
        })
    }

    /// Forwards one media chunk as its own `realtimeInput` message.
    pub async fn send_media_chunk(&self, chunk: &MediaChunk) -> Result<(), RelayError> {
        let realtime_input = BidiGenerateContentRealtimeInput {
            media_chunks: vec![chunk.to_blob()],
        };
        self.send_message(ClientMessagePayload::RealtimeInput(realtime_input))
            .await
    }

    pub async fn send_tool_response(
        &self,
        function_responses: Vec<FunctionResponse>,
    ) -> Result<(), RelayError> {
        self.send_message(ClientMessagePayload::ToolResponse(
            BidiGenerateContentToolResponse { function_responses },
        ))
        .await
    }
}

impl Drop for LiveSessionHandle {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some() {
            warn!("[SessionHandle] Dropped without explicit close(). Signalling shutdown.");
            self.close();
        }
    }
}
