//! Stream Codec
//!
//! JSON encoding and decoding for the Twelve Data price stream.
//!
//! Inbound frames are decoded into a [`Quote`] without interpreting the
//! schema: any well-formed JSON value is accepted and relayed as-is.
//! Binary frames are treated as UTF-8 JSON.

use crate::domain::quote::{Quote, SubscribeRequest};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON codec for the provider stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not valid JSON.
    pub fn decode(&self, text: &str) -> Result<Quote, CodecError> {
        Ok(Quote::new(serde_json::from_str(text)?))
    }

    /// Decode a binary frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not valid UTF-8 JSON.
    pub fn decode_bytes(&self, data: &[u8]) -> Result<Quote, CodecError> {
        Ok(Quote::new(serde_json::from_slice(data)?))
    }

    /// Encode the subscription control frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_subscribe(&self, request: &SubscribeRequest) -> Result<String, CodecError> {
        Ok(request.to_json()?)
    }
}
