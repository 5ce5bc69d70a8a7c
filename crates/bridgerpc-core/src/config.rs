//! Channel configuration and protocol constants

use crate::{RpcError, RpcResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Constants shared by the Rust runtime and every generated stub.
///
/// The code generator renders these values into the stubs, so changing a
/// default here changes the wire behavior of every target language.
pub mod protocol {
    /// Practical per-message ceiling of the host bridge, in bytes of encoded frame
    pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

    /// Bytes reserved for the JSON framing around one chunk's payload
    pub const ENVELOPE_OVERHEAD: usize = 1024;

    /// Default client deadline in milliseconds
    pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

    /// Partial chunk sets older than this are evicted
    pub const DEFAULT_REASSEMBLY_TIMEOUT_MS: u64 = 30_000;

    /// Partial chunk sets buffered at once
    pub const DEFAULT_MAX_CHUNK_SETS: usize = 64;

    /// Bytes buffered across all partial chunk sets
    pub const DEFAULT_MAX_REASSEMBLY_BYTES: usize = 16 * 1024 * 1024;

    /// Finished chunk-set IDs remembered per allowed partial set
    pub const RETIRED_PER_CHUNK_SET: usize = 16;

    /// Raw payload bytes carried by one chunk for a given message ceiling.
    ///
    /// Payloads travel base64-encoded, so every 3 raw bytes cost 4 bytes of
    /// frame. Returns `None` when the ceiling leaves no room for a payload.
    pub fn chunk_payload_size(max_message_size: usize) -> Option<usize> {
        let available = max_message_size.checked_sub(ENVELOPE_OVERHEAD)?;
        let size = available / 4 * 3;
        (size > 0).then_some(size)
    }
}

/// Configuration for one RPC channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Largest frame handed to the transport in one `send`
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Client deadline for calls that do not pass their own timeout
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,

    /// Age after which an incomplete chunk set is evicted
    #[serde(default = "default_reassembly_timeout")]
    pub reassembly_timeout_ms: u64,

    /// Maximum number of incomplete chunk sets kept at once
    #[serde(default = "default_max_chunk_sets")]
    pub max_chunk_sets: usize,

    /// Maximum bytes buffered across incomplete chunk sets
    #[serde(default = "default_max_reassembly_bytes")]
    pub max_reassembly_bytes: usize,
}

fn default_max_message_size() -> usize {
    protocol::DEFAULT_MAX_MESSAGE_SIZE
}

fn default_call_timeout() -> u64 {
    protocol::DEFAULT_CALL_TIMEOUT_MS
}

fn default_reassembly_timeout() -> u64 {
    protocol::DEFAULT_REASSEMBLY_TIMEOUT_MS
}

fn default_max_chunk_sets() -> usize {
    protocol::DEFAULT_MAX_CHUNK_SETS
}

fn default_max_reassembly_bytes() -> usize {
    protocol::DEFAULT_MAX_REASSEMBLY_BYTES
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            call_timeout_ms: default_call_timeout(),
            reassembly_timeout_ms: default_reassembly_timeout(),
            max_chunk_sets: default_max_chunk_sets(),
            max_reassembly_bytes: default_max_reassembly_bytes(),
        }
    }
}

impl ChannelConfig {
    /// Create a configuration with protocol defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from JSON bytes
    ///
    /// Empty input yields the defaults; missing keys fall back per field.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes)
    }

    /// Set the per-message ceiling
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Set the default call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = duration_millis(timeout);
        self
    }

    /// Set the reassembly eviction window
    pub fn with_reassembly_timeout(mut self, timeout: Duration) -> Self {
        self.reassembly_timeout_ms = duration_millis(timeout);
        self
    }

    /// Set the reassembly budget (set count and total bytes)
    pub fn with_reassembly_limits(mut self, max_chunk_sets: usize, max_bytes: usize) -> Self {
        self.max_chunk_sets = max_chunk_sets;
        self.max_reassembly_bytes = max_bytes;
        self
    }

    /// Default call timeout as a [`Duration`]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Reassembly eviction window as a [`Duration`]
    pub fn reassembly_timeout(&self) -> Duration {
        Duration::from_millis(self.reassembly_timeout_ms)
    }

    /// Raw payload bytes per chunk for this configuration's ceiling
    pub fn chunk_size(&self) -> RpcResult<usize> {
        protocol::chunk_payload_size(self.max_message_size).ok_or_else(|| {
            RpcError::ConfigError(format!(
                "max_message_size {} leaves no room beyond the {}-byte envelope overhead",
                self.max_message_size,
                protocol::ENVELOPE_OVERHEAD
            ))
        })
    }

    /// Check that the configuration can drive a channel
    pub fn validate(&self) -> RpcResult<()> {
        self.chunk_size()?;
        if self.call_timeout_ms == 0 {
            return Err(RpcError::ConfigError(
                "call_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_chunk_sets == 0 {
            return Err(RpcError::ConfigError(
                "max_chunk_sets must be greater than zero".to_string(),
            ));
        }
        if self.max_reassembly_bytes < self.max_message_size {
            return Err(RpcError::ConfigError(format!(
                "max_reassembly_bytes {} is smaller than max_message_size {}",
                self.max_reassembly_bytes, self.max_message_size
            )));
        }
        Ok(())
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
