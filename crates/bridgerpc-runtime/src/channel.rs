//! One bidirectional RPC channel over a host bridge
//!
//! A channel plays both roles at once: it issues calls to the peer and serves
//! calls from the peer through its [`HandlerRegistry`]. Every frame the host
//! receives goes to [`RpcChannel::handle_inbound`]; every frame the channel
//! produces goes out through its [`Transport`].

use crate::{HandlerRegistry, PendingCalls, PendingGuard, Transport};
use bridgerpc_core::{ChannelConfig, RpcError, RpcResult};
use bridgerpc_transport::{
    ChunkAssembler, ChunkOutcome, Codec, JsonCodec, ReassemblyLimits, RpcEnvelope,
    chunk_size_within, split_envelope,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct ChannelInner {
    config: ChannelConfig,
    chunk_size: usize,
    codec: JsonCodec,
    transport: Box<dyn Transport>,
    pending: Arc<PendingCalls>,
    handlers: Arc<HandlerRegistry>,
    assembler: Mutex<ChunkAssembler>,
    runtime: Handle,
    closed: AtomicBool,
}

/// Client and server endpoint of one bridge connection
#[derive(Clone)]
pub struct RpcChannel {
    inner: Arc<ChannelInner>,
}

impl RpcChannel {
    /// Create a channel on the current Tokio runtime
    pub fn new(transport: impl Transport, config: ChannelConfig) -> RpcResult<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            RpcError::RuntimeError(format!("RpcChannel::new needs a Tokio runtime: {e}"))
        })?;
        Self::with_runtime(transport, config, runtime)
    }

    /// Create a channel whose server handlers run on `runtime`
    ///
    /// Use this when [`RpcChannel::handle_inbound`] is called from threads the
    /// runtime does not own, such as a UI thread.
    pub fn with_runtime(
        transport: impl Transport,
        config: ChannelConfig,
        runtime: Handle,
    ) -> RpcResult<Self> {
        config.validate()?;
        let chunk_size = config.chunk_size()?;
        let limits = ReassemblyLimits::from_config(&config);

        info!(
            max_message_size = config.max_message_size,
            chunk_size,
            call_timeout_ms = config.call_timeout_ms,
            "bridge channel created"
        );

        Ok(Self {
            inner: Arc::new(ChannelInner {
                config,
                chunk_size,
                codec: JsonCodec::new(),
                transport: Box::new(transport),
                pending: Arc::new(PendingCalls::new()),
                handlers: Arc::new(HandlerRegistry::new()),
                assembler: Mutex::new(ChunkAssembler::new(limits)),
                runtime,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Server-side handlers for calls arriving from the peer
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.inner.handlers
    }

    /// Number of calls awaiting a response
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of incomplete inbound chunk sets
    pub fn pending_chunk_sets(&self) -> usize {
        self.inner.assembler.lock().pending_sets()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Call `method` with the configured default timeout
    pub async fn call(&self, method: &str, payload: Vec<u8>) -> RpcResult<Vec<u8>> {
        self.call_with_timeout(method, payload, self.inner.config.call_timeout())
            .await
    }

    /// Call `method` and wait at most `timeout` for the response
    ///
    /// Dropping the returned future abandons the call; a response that
    /// arrives afterwards is ignored.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> RpcResult<Vec<u8>> {
        if self.is_closed() {
            return Err(RpcError::ChannelClosed);
        }

        let (request_id, receiver) = self.inner.pending.register();
        let _guard = PendingGuard::new(Arc::clone(&self.inner.pending), request_id.clone());

        let request = RpcEnvelope::request(request_id.as_str(), method, payload);
        debug!(%request_id, method, bytes = request.payload().len(), "sending call");
        self.send_envelope(&request)?;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::ChannelClosed),
            Err(_) => {
                warn!(%request_id, method, timeout_ms = timeout.as_millis() as u64, "call timed out");
                Err(RpcError::Timeout)
            }
        }
    }

    /// Call `method` with protobuf messages on both sides
    pub async fn call_message<Req, Resp>(&self, method: &str, request: &Req) -> RpcResult<Resp>
    where
        Req: prost::Message,
        Resp: prost::Message + Default,
    {
        let bytes = self.call(method, request.encode_to_vec()).await?;
        Ok(Resp::decode(bytes.as_slice())?)
    }

    /// Feed one frame received from the peer
    ///
    /// Malformed frames and corrupted chunk sets never close the channel;
    /// they fail at most the one call or request they belong to.
    pub fn handle_inbound(&self, frame: &[u8]) {
        let envelope = match self.inner.codec.decode(frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(bytes = frame.len(), error = %err, "dropping malformed inbound frame");
                return;
            }
        };

        let outcome = self.inner.assembler.lock().accept(envelope);
        match outcome {
            ChunkOutcome::Complete(envelope) if envelope.is_request() => self.serve(envelope),
            ChunkOutcome::Complete(envelope) => self.resolve(envelope),
            ChunkOutcome::Pending | ChunkOutcome::Ignored => {}
            ChunkOutcome::Corrupted {
                request_id,
                method,
                is_request,
                reason,
            } => {
                let err = RpcError::ProtocolCorruption(reason);
                if is_request {
                    let response = RpcEnvelope::error_response(request_id, method, err.to_string());
                    self.send_response(&response);
                } else {
                    self.inner.pending.complete(&request_id, Err(err));
                }
            }
        }
    }

    /// Evict expired chunk sets; returns how many were evicted
    pub fn sweep(&self) -> usize {
        self.inner.assembler.lock().sweep().len()
    }

    /// Sweep expired chunk sets every `interval` until the channel is dropped or closed
    pub fn start_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<ChannelInner> = Arc::downgrade(&self.inner);
        self.inner.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if inner.closed.load(Ordering::SeqCst) {
                    break;
                }
                RpcChannel { inner }.sweep();
            }
        })
    }

    /// Fail every pending call and refuse new ones
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            let failed = self.inner.pending.fail_all(&RpcError::ChannelClosed);
            info!(failed_calls = failed, "bridge channel closed");
        }
    }

    fn serve(&self, request: RpcEnvelope) {
        let channel = self.clone();
        self.inner.runtime.spawn(async move {
            let response = channel.inner.handlers.dispatch(request).await;
            channel.send_response(&response);
        });
    }

    fn resolve(&self, response: RpcEnvelope) {
        let request_id = response.request_id().to_string();
        let method = response.method().to_string();
        let outcome = response.into_result().map_err(RpcError::Remote);
        if !self.inner.pending.complete(&request_id, outcome) {
            debug!(%request_id, %method, "ignoring response for unknown or expired call");
        }
    }

    fn send_response(&self, response: &RpcEnvelope) {
        if let Err(err) = self.send_envelope(response) {
            warn!(
                request_id = %response.request_id(),
                method = %response.method(),
                error = %err,
                "failed to send response"
            );
        }
    }

    /// Encode and send, chunking when the frame exceeds the ceiling
    fn send_envelope(&self, envelope: &RpcEnvelope) -> RpcResult<()> {
        let inner = &self.inner;
        let frame = inner.codec.encode(envelope)?;
        if frame.len() <= inner.config.max_message_size {
            return inner.transport.send(frame);
        }

        if envelope.error().is_some() {
            debug!(
                request_id = %envelope.request_id(),
                "truncating oversized error text"
            );
            let frame = inner
                .codec
                .encode_truncating_error(envelope, inner.config.max_message_size)?;
            return inner.transport.send(frame);
        }

        let chunk_set_id = Uuid::new_v4().to_string();
        let chunk_size = chunk_size_within(
            &inner.codec,
            envelope,
            &chunk_set_id,
            inner.chunk_size,
            inner.config.max_message_size,
        )?;
        let chunks = split_envelope(envelope, chunk_size, &chunk_set_id);
        debug!(
            request_id = %envelope.request_id(),
            %chunk_set_id,
            chunks = chunks.len(),
            chunk_size,
            bytes = envelope.payload().len(),
            "sending chunked envelope"
        );
        for chunk in &chunks {
            inner.transport.send(inner.codec.encode(chunk)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "channel/channel_tests.rs"]
mod channel_tests;
