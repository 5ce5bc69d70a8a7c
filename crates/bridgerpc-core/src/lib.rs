//! bridgerpc-core - Error types, protocol constants and channel configuration
//!
//! This crate provides the foundational types shared by every bridgerpc crate:
//! - [`RpcError`] and [`RpcResult`] for error handling
//! - [`ChannelConfig`] for per-channel limits and timeouts
//! - [`protocol`] constants that the runtime and the generated stubs agree on

mod config;
mod error;

pub use config::{ChannelConfig, protocol};
pub use error::{RpcError, RpcResult};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{ChannelConfig, RpcError, RpcResult, protocol};
}
