//! Error types for bridgerpc channels

use thiserror::Error;

/// Result type alias for channel operations
pub type RpcResult<T> = Result<T, RpcError>;

/// Error type for channel operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// No handler is registered for the requested method
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// A chunk set failed identity or length validation
    #[error("protocol corruption: {0}")]
    ProtocolCorruption(String),

    /// The caller's deadline expired before a response arrived
    #[error("call timed out")]
    Timeout,

    /// The remote side answered with an error response
    #[error("remote error: {0}")]
    Remote(String),

    /// A server handler failed
    #[error("handler error: {0}")]
    HandlerError(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The transport refused an outbound frame
    #[error("transport error: {0}")]
    TransportError(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Async runtime error
    #[error("runtime error: {0}")]
    RuntimeError(String),

    /// The channel dropped the call before it resolved
    #[error("channel closed")]
    ChannelClosed,
}

impl RpcError {
    /// Short, stable name of the error kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::UnknownMethod(_) => "unknown_method",
            RpcError::ProtocolCorruption(_) => "protocol_corruption",
            RpcError::Timeout => "timeout",
            RpcError::Remote(_) => "remote",
            RpcError::HandlerError(_) => "handler",
            RpcError::SerializationError(_) => "serialization",
            RpcError::TransportError(_) => "transport",
            RpcError::ConfigError(_) => "config",
            RpcError::RuntimeError(_) => "runtime",
            RpcError::ChannelClosed => "channel_closed",
        }
    }

    /// Whether the error was produced on this side of the channel
    ///
    /// Only [`RpcError::Remote`] originates from the peer.
    pub fn is_local(&self) -> bool {
        !matches!(self, RpcError::Remote(_))
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::SerializationError(err.to_string())
    }
}

impl From<prost::DecodeError> for RpcError {
    fn from(err: prost::DecodeError) -> Self {
        RpcError::SerializationError(err.to_string())
    }
}

impl From<prost::EncodeError> for RpcError {
    fn from(err: prost::EncodeError) -> Self {
        RpcError::SerializationError(err.to_string())
    }
}
