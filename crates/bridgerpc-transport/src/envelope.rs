//! Envelope types carried over the host bridge

use serde::{Deserialize, Serialize};

/// Position of one chunk inside a chunk set
///
/// All chunks produced from one oversized envelope share a `chunk_set_id`,
/// which is allocated per send and never derived from the request ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInfo {
    /// Groups all chunks of one logical send
    pub chunk_set_id: String,

    /// Zero-based position of this chunk
    pub chunk_index: u32,

    /// Number of chunks in the set
    pub total_chunks: u32,

    /// Byte length of the reassembled payload
    pub original_size: u64,
}

/// One transport-level message: a full or partial call or response
///
/// Fields are read-only once constructed. Response constructors guarantee
/// that `error` and a non-empty `payload` never appear together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcEnvelope {
    request_id: String,

    is_request: bool,

    /// Fully-qualified `package.Service.Method`
    method: String,

    /// Serialized message bytes, base64 on the wire
    #[serde(default, with = "base64_payload")]
    payload: Vec<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk_info: Option<ChunkInfo>,
}

impl RpcEnvelope {
    /// Create a request envelope
    pub fn request(
        request_id: impl Into<String>,
        method: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            is_request: true,
            method: method.into(),
            payload,
            error: None,
            chunk_info: None,
        }
    }

    /// Create a success response envelope
    pub fn success_response(
        request_id: impl Into<String>,
        method: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            is_request: false,
            method: method.into(),
            payload,
            error: None,
            chunk_info: None,
        }
    }

    /// Create an error response envelope with an empty payload
    pub fn error_response(
        request_id: impl Into<String>,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            is_request: false,
            method: method.into(),
            payload: Vec::new(),
            error: Some(message.into()),
            chunk_info: None,
        }
    }

    /// Success response correlated with `request`
    pub fn reply(request: &RpcEnvelope, payload: Vec<u8>) -> Self {
        Self::success_response(request.request_id.clone(), request.method.clone(), payload)
    }

    /// Error response correlated with `request`
    pub fn reply_error(request: &RpcEnvelope, message: impl Into<String>) -> Self {
        Self::error_response(request.request_id.clone(), request.method.clone(), message)
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn is_request(&self) -> bool {
        self.is_request
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn chunk_info(&self) -> Option<&ChunkInfo> {
        self.chunk_info.as_ref()
    }

    /// Take ownership of the payload bytes
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Convert a response into its outcome: the payload, or the error text
    pub fn into_result(self) -> Result<Vec<u8>, String> {
        match self.error {
            Some(message) => Err(message),
            None => Ok(self.payload),
        }
    }

    /// Shorten the error text to at most `max_bytes`, on a character boundary
    pub fn with_error_truncated(mut self, max_bytes: usize) -> Self {
        if let Some(message) = self.error.as_mut() {
            if message.len() > max_bytes {
                let mut end = max_bytes;
                while !message.is_char_boundary(end) {
                    end -= 1;
                }
                message.truncate(end);
            }
        }
        self
    }

    /// Check the envelope-level invariants of a decoded frame
    pub fn validate(&self) -> Result<(), String> {
        if self.request_id.is_empty() {
            return Err("envelope has an empty requestId".to_string());
        }
        if self.error.is_some() && self.is_request {
            return Err("request envelope carries an error".to_string());
        }
        if self.error.is_some() && !self.payload.is_empty() {
            return Err("response carries both an error and a payload".to_string());
        }
        Ok(())
    }

    /// Copy of this envelope carrying one piece of its payload
    pub(crate) fn chunk(&self, info: ChunkInfo, piece: Vec<u8>) -> Self {
        Self {
            request_id: self.request_id.clone(),
            is_request: self.is_request,
            method: self.method.clone(),
            payload: piece,
            error: self.error.clone(),
            chunk_info: Some(info),
        }
    }

    /// Complete envelope rebuilt from a chunk's metadata and the joined payload
    pub(crate) fn reassembled(&self, payload: Vec<u8>) -> Self {
        Self {
            request_id: self.request_id.clone(),
            is_request: self.is_request,
            method: self.method.clone(),
            payload,
            error: self.error.clone(),
            chunk_info: None,
        }
    }
}

mod base64_payload {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
