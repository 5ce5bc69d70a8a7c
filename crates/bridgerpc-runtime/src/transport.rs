//! Outbound side of the host bridge

use bridgerpc_core::RpcResult;

/// Sends one encoded frame across the bridge
///
/// The inbound side is driven by the host calling
/// [`RpcChannel::handle_inbound`](crate::RpcChannel::handle_inbound) for every
/// message it receives.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, frame: Vec<u8>) -> RpcResult<()>;
}

impl<F> Transport for F
where
    F: Fn(Vec<u8>) -> RpcResult<()> + Send + Sync + 'static,
{
    fn send(&self, frame: Vec<u8>) -> RpcResult<()> {
        self(frame)
    }
}
