//! Relay between local websocket clients and the Gemini Live API.
//!
//! Each client connection gets its own remote session. Audio and image
//! chunks flow up, model text and audio flow down, and function calls for
//! tools registered in the relay are executed locally and answered without
//! the client taking part.

pub mod bridge;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod server;
pub mod tools;
pub mod types;

pub use bridge::{SessionBridge, SessionState};
pub use client::{Connector, GeminiConnector, LiveSession, LiveSessionHandle, SetupBuilder};
pub use codec::{ClientFrame, MediaChunk, MediaKind, ServerFrame};
pub use config::RelayConfig;
pub use error::RelayError;
pub use server::RelayServer;
pub use tools::{LoggingOrderStore, OrderStore, ToolHandler, ToolRegistry};
