use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or malformed setup frame. Ends the session before any remote
    /// connection is opened.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A single client frame could not be decoded. The frame is dropped.
    #[error("Failed to decode client frame: {0}")]
    Decode(String),

    #[error("Failed to connect to remote session: {0}")]
    RemoteConnect(String),

    #[error("Remote session stream failed: {0}")]
    RemoteStream(String),

    #[error("Tool '{name}' failed: {reason}")]
    ToolDispatch { name: String, reason: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Client connection error: {0}")]
    ClientConnection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Remote session is closed")]
    NotReady,
}

impl RelayError {
    pub(crate) fn tool_dispatch(name: &str, reason: impl Into<String>) -> Self {
        RelayError::ToolDispatch {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
