//! Gemini Live wire types and their translation into [`RemoteEvent`]s.
//!
//! The outgoing payloads mirror the `BidiGenerateContent*` client messages.
//! Incoming server messages are parsed loosely (every field optional) and then
//! folded into explicit tagged variants so the relay never has to probe for
//! optional fields further downstream.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Client -> Gemini
// ---------------------------------------------------------------------------

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessagePayload {
    Setup(Value),
    RealtimeInput(BidiGenerateContentRealtimeInput),
    ToolResponse(BidiGenerateContentToolResponse),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BidiGenerateContentRealtimeInput {
    pub media_chunks: Vec<Blob>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BidiGenerateContentToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

/// Base64 payload tagged with its MIME type, exactly as it travels on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub response: Value,
}

impl FunctionResponse {
    /// Wraps a tool result the way Gemini expects it: `{"result": <value>}`.
    pub fn new(id: impl Into<String>, name: impl Into<String>, result: Value) -> Self {
        let mut response = Map::new();
        response.insert("result".to_string(), result);
        Self {
            id: id.into(),
            name: name.into(),
            response: Value::Object(response),
        }
    }
}

// ---------------------------------------------------------------------------
// Gemini -> client
// ---------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BidiGenerateContentServerMessage {
    pub setup_complete: Option<Value>,
    pub server_content: Option<BidiGenerateContentServerContent>,
    pub tool_call: Option<BidiGenerateContentToolCall>,
    pub tool_call_cancellation: Option<BidiGenerateContentToolCallCancellation>,
    pub go_away: Option<GoAway>,
    pub usage_metadata: Option<Value>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BidiGenerateContentServerContent {
    pub model_turn: Option<Content>,
    pub turn_complete: Option<bool>,
    pub interrupted: Option<bool>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    pub role: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    pub inline_data: Option<Blob>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BidiGenerateContentToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct BidiGenerateContentToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    pub time_left: Option<String>,
}

/// One unit of model output, in the order the remote session produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    Content(ContentEvent),
    ToolCall(ToolCallEvent),
    ToolCallCancellation { ids: Vec<String> },
    GoAway { time_left: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContentEvent {
    pub parts: Vec<ModelPart>,
    pub turn_complete: bool,
    pub interrupted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelPart {
    Text(String),
    InlineData { mime_type: String, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolCallEvent {
    pub calls: Vec<FunctionCall>,
}

impl BidiGenerateContentServerMessage {
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    pub fn into_events(self) -> Vec<RemoteEvent> {
        let mut events = Vec::new();

        if let Some(content) = self.server_content {
            let parts = content
                .model_turn
                .map(|turn| turn.parts)
                .unwrap_or_default()
                .into_iter()
                .filter_map(Part::into_model_part)
                .collect();
            events.push(RemoteEvent::Content(ContentEvent {
                parts,
                turn_complete: content.turn_complete.unwrap_or(false),
                interrupted: content.interrupted.unwrap_or(false),
            }));
        }

        if let Some(tool_call) = self.tool_call {
            events.push(RemoteEvent::ToolCall(ToolCallEvent {
                calls: tool_call.function_calls,
            }));
        }

        if let Some(cancellation) = self.tool_call_cancellation {
            events.push(RemoteEvent::ToolCallCancellation {
                ids: cancellation.ids,
            });
        }

        if let Some(go_away) = self.go_away {
            events.push(RemoteEvent::GoAway {
                time_left: go_away.time_left,
            });
        }

        events
    }
}

impl Part {
    fn into_model_part(self) -> Option<ModelPart> {
        match (self.text, self.inline_data) {
            (Some(text), _) => Some(ModelPart::Text(text)),
            (None, Some(blob)) => {
                match base64::engine::general_purpose::STANDARD.decode(&blob.data) {
                    Ok(data) => Some(ModelPart::InlineData {
                        mime_type: blob.mime_type,
                        data,
                    }),
                    Err(e) => {
                        warn!(
                            "[Types] Dropping inline data part ({}) with invalid base64: {}",
                            blob.mime_type, e
                        );
                        None
                    }
                }
            }
            (None, None) => {
                debug!("[Types] Skipping model part without text or inline data.");
                None
            }
        }
    }
}
