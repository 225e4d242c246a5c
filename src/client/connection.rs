use super::{Connector, LiveSession, SESSION_CHANNEL_CAPACITY};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::types::{BidiGenerateContentServerMessage, ClientMessagePayload, RemoteEvent};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Once};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{self, Message, protocol::frame::coding::CloseCode};
use tracing::{debug, error, info, warn};
use url::Url;

type EventSender = mpsc::Sender<Result<RemoteEvent, RelayError>>;

/// Opens sessions against the Gemini Live websocket endpoint.
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    config: Arc<RelayConfig>,
}

impl GeminiConnector {
    pub fn new(config: Arc<RelayConfig>) -> Self {
        Self { config }
    }
}

impl Connector for GeminiConnector {
    fn connect(
        &self,
        setup: Value,
    ) -> impl Future<Output = Result<LiveSession, RelayError>> + Send {
        let config = self.config.clone();
        async move { open_session(&config, setup).await }
    }
}

pub(crate) fn build_ws_url(config: &RelayConfig) -> Result<Url, RelayError> {
    let mut url = Url::parse(&format!(
        "wss://{}/ws/google.ai.generativelanguage.{}.GenerativeService.BidiGenerateContent",
        config.host, config.api_version
    ))
    .map_err(|e| RelayError::Config(format!("Invalid Gemini endpoint: {}", e)))?;
    url.query_pairs_mut().append_pair("key", &config.api_key);
    Ok(url)
}

fn install_crypto_provider() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // Fails only when another provider is already installed, which is fine.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

async fn open_session(config: &RelayConfig, setup: Value) -> Result<LiveSession, RelayError> {
    install_crypto_provider();
    let url = build_ws_url(config)?;

    info!("[Connection] Connecting to Gemini Live ({})", config.host);
    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| RelayError::RemoteConnect(e.to_string()))?;
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    let setup_json = serde_json::to_string(&ClientMessagePayload::Setup(setup))?;
    ws_sink
        .send(Message::Text(setup_json.into()))
        .await
        .map_err(|e| RelayError::RemoteConnect(format!("failed to send setup: {}", e)))?;

    match tokio::time::timeout(config.setup_timeout, await_setup_complete(&mut ws_stream)).await {
        Ok(Ok(())) => info!("[Connection] Setup complete."),
        Ok(Err(e)) => {
            let _ = ws_sink.close().await;
            return Err(e);
        }
        Err(_) => {
            let _ = ws_sink.close().await;
            return Err(RelayError::RemoteConnect(format!(
                "no setupComplete within {:?}",
                config.setup_timeout
            )));
        }
    }

    let (outgoing_tx, outgoing_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
    let (events_tx, events_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    spawn_processing_task(ws_sink, ws_stream, shutdown_rx, outgoing_rx, events_tx);

    Ok(LiveSession::new(outgoing_tx, events_rx, shutdown_tx))
}

async fn await_setup_complete<St>(ws_stream: &mut St) -> Result<(), RelayError>
where
    St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(message) = ws_stream.next().await {
        let message = message.map_err(|e| RelayError::RemoteConnect(e.to_string()))?;
        let bytes = match &message {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(data) => data.as_ref(),
            Message::Close(frame) => {
                let reason = frame
                    .as_ref()
                    .map(|f| format!("{} {}", f.code, f.reason.as_str()))
                    .unwrap_or_else(|| "no close frame".to_string());
                return Err(RelayError::RemoteConnect(format!(
                    "remote closed during setup: {}",
                    reason
                )));
            }
            _ => continue,
        };
        match serde_json::from_slice::<BidiGenerateContentServerMessage>(bytes) {
            Ok(msg) if msg.is_setup_complete() => return Ok(()),
            Ok(_) => debug!("[Connection] Ignoring message received before setupComplete."),
            Err(e) => warn!("[Connection] Unparseable message during setup: {}", e),
        }
    }
    Err(RelayError::RemoteConnect(
        "remote closed before setupComplete".to_string(),
    ))
}

/// Owns the websocket for the lifetime of the session.
///
/// Writing and reading run as two futures polled side by side, so a reader
/// waiting for room in `events_tx` never holds up outgoing payloads. The task
/// ends when shutdown is signalled or either direction finishes.
pub(crate) fn spawn_processing_task<Si, St>(
    mut ws_sink: Si,
    mut ws_stream: St,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut outgoing_rx: mpsc::Receiver<ClientMessagePayload>,
    events_tx: EventSender,
) where
    Si: Sink<Message, Error = tungstenite::Error> + Unpin + Send + 'static,
    St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                info!("[Connection] Shutdown signal received.");
            }
            _ = write_outgoing(&mut ws_sink, &mut outgoing_rx, &events_tx) => {
                debug!("[Connection] Writer finished.");
            }
            _ = read_incoming(&mut ws_stream, &events_tx) => {
                debug!("[Connection] Reader finished.");
            }
        }

        if let Err(e) = ws_sink.close().await {
            debug!("[Connection] Error closing Gemini websocket: {}", e);
        }
        info!("[Connection] Processing task finished.");
    });
}

/// Drains the outgoing channel into the socket until the handle is closed
/// or a send fails.
async fn write_outgoing<Si>(
    ws_sink: &mut Si,
    outgoing_rx: &mut mpsc::Receiver<ClientMessagePayload>,
    events_tx: &EventSender,
) where
    Si: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(payload) = outgoing_rx.recv().await {
        let json = match serde_json::to_string(&payload) {
            Ok(json) => json,
            Err(e) => {
                error!("[Connection] Failed to serialize outgoing payload: {}", e);
                continue;
            }
        };
        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
            error!("[Connection] Failed to send to Gemini: {}", e);
            let _ = events_tx.send(Err(RelayError::RemoteStream(e.to_string()))).await;
            return;
        }
    }
    info!("[Connection] Outgoing channel closed.");
}

/// Translates incoming messages into events until the remote closes, the
/// stream fails or nobody is listening anymore.
async fn read_incoming<St>(ws_stream: &mut St, events_tx: &EventSender)
where
    St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(incoming) = ws_stream.next().await {
        let keep_going = match incoming {
            Ok(Message::Text(text)) => forward_events(text.as_bytes(), events_tx).await,
            Ok(Message::Binary(data)) => forward_events(&data, events_tx).await,
            Ok(Message::Close(frame)) => {
                match frame {
                    Some(frame) if frame.code != CloseCode::Normal => {
                        warn!(
                            "[Connection] Gemini closed the session: {} {}",
                            frame.code,
                            frame.reason.as_str()
                        );
                        let _ = events_tx
                            .send(Err(RelayError::RemoteStream(format!(
                                "closed by remote: {} {}",
                                frame.code,
                                frame.reason.as_str()
                            ))))
                            .await;
                    }
                    _ => info!("[Connection] Gemini closed the session normally."),
                }
                false
            }
            Ok(_) => true,
            Err(e) => {
                error!("[Connection] Gemini stream error: {}", e);
                let _ = events_tx.send(Err(RelayError::RemoteStream(e.to_string()))).await;
                false
            }
        };
        if !keep_going {
            return;
        }
    }
    info!("[Connection] Gemini stream ended.");
}

/// Returns `false` once nobody is listening for events anymore.
async fn forward_events(bytes: &[u8], events_tx: &EventSender) -> bool {
    let message = match serde_json::from_slice::<BidiGenerateContentServerMessage>(bytes) {
        Ok(message) => message,
        Err(e) => {
            warn!("[Connection] Dropping unparseable server message: {}", e);
            return true;
        }
    };
    if message.usage_metadata.is_some() {
        debug!("[Connection] Usage metadata: {:?}", message.usage_metadata);
    }
    for event in message.into_events() {
        if events_tx.send(Ok(event)).await.is_err() {
            info!("[Connection] Event receiver dropped.");
            return false;
        }
    }
    true
}
