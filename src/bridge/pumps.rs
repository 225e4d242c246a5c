use crate::client::LiveSessionHandle;
use crate::codec::{self, ClientFrame, ServerFrame};
use crate::error::RelayError;
use crate::tools::ToolRegistry;
use crate::types::{ContentEvent, FunctionResponse, ModelPart, RemoteEvent, ToolCallEvent};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

/// Client -> remote. Ends with `Ok` when the client goes away cleanly.
pub(crate) async fn client_to_remote<St>(
    client_stream: &mut St,
    remote: &LiveSessionHandle,
) -> Result<(), RelayError>
where
    St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(message) = client_stream.next().await {
        let message = message.map_err(|e| RelayError::ClientConnection(e.to_string()))?;
        let frame = match &message {
            Message::Text(text) => codec::decode_client_frame(text.as_bytes()),
            Message::Binary(data) => codec::decode_client_frame(data),
            Message::Close(_) => {
                info!("[Bridge] Client sent close frame.");
                return Ok(());
            }
            _ => continue,
        };

        match frame {
            Ok(ClientFrame::RealtimeInput(input)) => {
                for chunk in &input.media_chunks {
                    remote.send_media_chunk(chunk).await?;
                }
            }
            Ok(ClientFrame::Setup(_)) => {
                warn!("[Bridge] Ignoring repeated setup frame from client.");
            }
            Err(e) => {
                warn!("[Bridge] Dropping client frame: {}", e);
            }
        }
    }
    info!("[Bridge] Client connection closed (send).");
    Ok(())
}

/// Remote -> client, including tool-call interception. Ends with `Ok` when
/// the remote session closes normally.
pub(crate) async fn remote_to_client<Si>(
    events: &mut mpsc::Receiver<Result<RemoteEvent, RelayError>>,
    client_sink: &mut Si,
    remote: &LiveSessionHandle,
    registry: &ToolRegistry,
) -> Result<(), RelayError>
where
    Si: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(event) = events.recv().await {
        match event? {
            RemoteEvent::Content(content) => forward_content(content, client_sink).await?,
            RemoteEvent::ToolCall(tool_call) => {
                handle_tool_call(tool_call, client_sink, remote, registry).await?
            }
            RemoteEvent::ToolCallCancellation { ids } => {
                info!("[Bridge] Remote cancelled tool calls: {:?}", ids);
            }
            RemoteEvent::GoAway { time_left } => {
                warn!(
                    "[Bridge] Remote session will end soon (time left: {}).",
                    time_left.as_deref().unwrap_or("unknown")
                );
            }
        }
    }
    info!("[Bridge] Remote session closed (receive).");
    Ok(())
}

async fn forward_content<Si>(content: ContentEvent, client_sink: &mut Si) -> Result<(), RelayError>
where
    Si: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    for part in content.parts {
        let frame = match part {
            ModelPart::Text(text) => ServerFrame::Text(text),
            ModelPart::InlineData { mime_type, data } => {
                debug!("[Bridge] Audio received ({}, {} bytes)", mime_type, data.len());
                ServerFrame::audio(&data)
            }
        };
        send_frame(client_sink, &frame).await?;
    }
    if content.interrupted {
        info!("[Bridge] Model turn interrupted.");
    }
    if content.turn_complete {
        info!("[Bridge] Turn complete.");
    }
    Ok(())
}

/// Runs every recognised call, echoes the running list of responses to the
/// client after each success, then returns the whole batch upstream in one
/// message. Failed and unknown calls are logged and left out; an event with
/// no successful call sends nothing upstream.
async fn handle_tool_call<Si>(
    tool_call: ToolCallEvent,
    client_sink: &mut Si,
    remote: &LiveSessionHandle,
    registry: &ToolRegistry,
) -> Result<(), RelayError>
where
    Si: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    info!("[Bridge] Tool call received ({} calls).", tool_call.calls.len());
    let mut responses: Vec<FunctionResponse> = Vec::new();

    for call in tool_call.calls {
        let result = match registry.dispatch(&call.name, call.args) {
            Ok(result) => result,
            Err(RelayError::UnknownTool(name)) => {
                warn!("[Bridge] Model called unknown tool '{}'; skipping.", name);
                continue;
            }
            Err(e) => {
                error!("[Bridge] Error executing function: {}", e);
                continue;
            }
        };

        responses.push(FunctionResponse::new(call.id, call.name, result));
        let echo = serde_json::to_string(&responses)?;
        send_frame(client_sink, &ServerFrame::Text(echo)).await?;
        info!("[Bridge] Function executed.");
    }

    if responses.is_empty() {
        debug!("[Bridge] No tool responses to send upstream.");
        return Ok(());
    }
    remote.send_tool_response(responses).await
}

async fn send_frame<Si>(client_sink: &mut Si, frame: &ServerFrame) -> Result<(), RelayError>
where
    Si: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let json = codec::encode_server_frame(frame)?;
    client_sink
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| RelayError::ClientConnection(e.to_string()))
}
