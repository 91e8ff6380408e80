//! Shared error types.

use thiserror::Error;

/// Errors raised while decoding an inbound frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON, or not a JSON object.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The frame decoded but carries no string `type` discriminator.
    #[error("envelope is missing a string `type` field")]
    MissingType,
}
