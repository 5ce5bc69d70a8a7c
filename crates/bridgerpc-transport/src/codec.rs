//! Frame codec
//!
//! A frame is the unit handed to the host transport: one encoded
//! [`RpcEnvelope`]. Decoding also checks the envelope invariants, so callers
//! only ever see envelopes that are safe to route.

use crate::RpcEnvelope;
use bridgerpc_core::RpcError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("cannot encode envelope: {0}")]
    Encode(String),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Malformed(err.to_string())
    }
}

impl From<CodecError> for RpcError {
    fn from(err: CodecError) -> Self {
        RpcError::SerializationError(err.to_string())
    }
}

/// Turns envelopes into frames and back
pub trait Codec: Send + Sync {
    fn encode(&self, envelope: &RpcEnvelope) -> Result<Vec<u8>, CodecError>;

    /// Decode one frame, rejecting envelopes that break the framing rules
    fn decode(&self, frame: &[u8]) -> Result<RpcEnvelope, CodecError>;

    /// Whether `envelope` encodes to at most `max_frame` bytes
    fn fits(&self, envelope: &RpcEnvelope, max_frame: usize) -> Result<bool, CodecError> {
        Ok(self.encode(envelope)?.len() <= max_frame)
    }

    /// Encode an error response, shortening its error text until the frame
    /// is at most `max_frame` bytes
    ///
    /// Escaping can make the text cost more than its own length, so every cut
    /// is measured against the encoded frame. Each cut removes at least the
    /// excess in raw bytes, which is never more than it removes in encoded bytes.
    fn encode_truncating_error(
        &self,
        envelope: &RpcEnvelope,
        max_frame: usize,
    ) -> Result<Vec<u8>, CodecError> {
        let mut fitted = envelope.clone();
        let mut frame = self.encode(&fitted)?;
        while frame.len() > max_frame {
            let error_len = fitted.error().map_or(0, str::len);
            if error_len == 0 {
                return Err(CodecError::Encode(format!(
                    "response for {} exceeds {max_frame} bytes without any error text",
                    envelope.method()
                )));
            }
            let excess = frame.len() - max_frame;
            fitted = fitted.with_error_truncated(error_len.saturating_sub(excess));
            frame = self.encode(&fitted)?;
        }
        Ok(frame)
    }
}

/// Compact JSON, the text format every generated stub speaks
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn encode_string(&self, envelope: &RpcEnvelope) -> Result<String, CodecError> {
        serde_json::to_string(envelope).map_err(|err| CodecError::Encode(err.to_string()))
    }

    pub fn decode_str(&self, frame: &str) -> Result<RpcEnvelope, CodecError> {
        self.decode(frame.as_bytes())
    }
}

impl Codec for JsonCodec {
    fn encode(&self, envelope: &RpcEnvelope) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(envelope).map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn decode(&self, frame: &[u8]) -> Result<RpcEnvelope, CodecError> {
        let envelope: RpcEnvelope = serde_json::from_slice(frame)?;
        envelope.validate().map_err(CodecError::InvalidEnvelope)?;
        Ok(envelope)
    }
}
