//! bridgerpc-runtime - Correlated calls and dispatch over a message bridge
//!
//! This crate provides:
//! - [`RpcChannel`] for client calls and server dispatch over one [`Transport`]
//! - [`PendingCalls`] for request/response correlation
//! - [`HandlerRegistry`] and [`MethodHandler`] for server-side methods

mod channel;
mod dispatch;
mod pending;
mod transport;

pub use channel::RpcChannel;
pub use dispatch::{HandlerRegistry, MethodHandler};
pub use pending::{CallOutcome, PendingCalls, PendingGuard};
pub use transport::Transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{HandlerRegistry, MethodHandler, RpcChannel, Transport};
    pub use bridgerpc_core::{ChannelConfig, RpcError, RpcResult};
}
