//! Error types for the editing bridge.

use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while talking to an editing surface.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The surface has not finished its startup handshake.
    #[error("surface is not ready")]
    NotReady,

    /// The surface was torn down before the operation completed.
    #[error("surface has been torn down")]
    TornDown,

    /// A paste was issued while another paste is still pending.
    #[error("a paste operation is already in flight")]
    PasteInFlight,

    /// The transport could not deliver a command.
    #[error("transport error: {0}")]
    Transport(String),

    /// The engine reported a failure for a specific command.
    #[error("engine error: {0}")]
    Engine(String),

    /// An inbound payload was not valid JSON.
    #[error("failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),

    /// An inbound payload decoded but did not have a usable shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Required static assets could not be staged.
    #[error("asset staging failed: {0}")]
    AssetStaging(String),

    /// Invalid state for operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
