//! JSON envelope spoken between the local client and the relay.
//!
//! Inbound: `{"setup": {...}}` once, then
//! `{"realtime_input": {"media_chunks": [{"mime_type": ..., "data": ...}]}}`.
//! Outbound: `{"text": ...}` or `{"audio": <base64>}`.
//!
//! Media payloads are never decoded here; the base64 string travels to the
//! remote session untouched.

use crate::error::RelayError;
use crate::types::Blob;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Setup(Value),
    RealtimeInput(RealtimeInput),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    AudioPcm,
    ImageJpeg,
}

impl MediaKind {
    /// Matches on the base type only, so `audio/pcm;rate=16000` is audio.
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        let base = mime_type.split(';').next().unwrap_or_default().trim();
        if base.eq_ignore_ascii_case("audio/pcm") {
            Some(MediaKind::AudioPcm)
        } else if base.eq_ignore_ascii_case("image/jpeg") {
            Some(MediaKind::ImageJpeg)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaChunk {
    pub kind: MediaKind,
    /// The MIME type exactly as the client sent it.
    pub mime_type: String,
    /// Base64 payload, passed through unchanged.
    pub data: String,
}

impl MediaChunk {
    pub fn to_blob(&self) -> Blob {
        Blob {
            mime_type: self.mime_type.clone(),
            data: self.data.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerFrame {
    Text(String),
    /// Base64-encoded audio bytes.
    Audio(String),
}

impl ServerFrame {
    pub fn audio(bytes: &[u8]) -> Self {
        ServerFrame::Audio(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

#[derive(Deserialize)]
struct RawClientFrame {
    setup: Option<Value>,
    #[serde(alias = "realtimeInput")]
    realtime_input: Option<RawRealtimeInput>,
}

#[derive(Deserialize)]
struct RawRealtimeInput {
    #[serde(default, alias = "mediaChunks")]
    media_chunks: Vec<RawMediaChunk>,
}

#[derive(Deserialize)]
struct RawMediaChunk {
    #[serde(alias = "mimeType")]
    mime_type: String,
    data: String,
}

pub fn decode_client_frame(raw: &[u8]) -> Result<ClientFrame, RelayError> {
    let frame: RawClientFrame =
        serde_json::from_slice(raw).map_err(|e| RelayError::Decode(e.to_string()))?;

    if let Some(setup) = frame.setup {
        if !setup.is_object() {
            return Err(RelayError::Decode(
                "setup must be a JSON object".to_string(),
            ));
        }
        return Ok(ClientFrame::Setup(setup));
    }

    let Some(input) = frame.realtime_input else {
        return Err(RelayError::Decode(
            "frame carries neither setup nor realtime_input".to_string(),
        ));
    };

    let media_chunks = input
        .media_chunks
        .into_iter()
        .filter_map(|chunk| match MediaKind::from_mime_type(&chunk.mime_type) {
            Some(kind) => Some(MediaChunk {
                kind,
                mime_type: chunk.mime_type,
                data: chunk.data,
            }),
            None => {
                debug!(
                    "[Codec] Ignoring media chunk with unsupported MIME type '{}'",
                    chunk.mime_type
                );
                None
            }
        })
        .collect();

    Ok(ClientFrame::RealtimeInput(RealtimeInput { media_chunks }))
}

pub fn encode_server_frame(frame: &ServerFrame) -> Result<String, RelayError> {
    Ok(serde_json::to_string(frame)?)
}
