//! Error types for the protocol layer.

/// Errors that can occur while parsing values or encoding/decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, wrong
    /// types, or a value (e.g., a negative wager) rejected by its parser.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A decimal amount could not be parsed.
    #[error("invalid amount {0}")]
    InvalidAmount(String),

    /// The message is well-formed but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
