//! Server-side method handlers and dispatch

use async_trait::async_trait;
use bridgerpc_core::{RpcError, RpcResult};
use bridgerpc_transport::RpcEnvelope;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handles calls to one fully-qualified method
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Turn the serialized input message into the serialized output message
    async fn handle(&self, payload: Vec<u8>) -> RpcResult<Vec<u8>>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MethodHandler for FnHandler<F>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = RpcResult<Vec<u8>>> + Send,
{
    async fn handle(&self, payload: Vec<u8>) -> RpcResult<Vec<u8>> {
        (self.0)(payload).await
    }
}

struct MessageHandler<F, Req> {
    func: F,
    _request: std::marker::PhantomData<fn() -> Req>,
}

#[async_trait]
impl<F, Fut, Req, Resp> MethodHandler for MessageHandler<F, Req>
where
    F: Fn(Req) -> Fut + Send + Sync,
    Fut: Future<Output = RpcResult<Resp>> + Send,
    Req: prost::Message + Default + 'static,
    Resp: prost::Message,
{
    async fn handle(&self, payload: Vec<u8>) -> RpcResult<Vec<u8>> {
        let request = Req::decode(payload.as_slice())?;
        let response = (self.func)(request).await?;
        Ok(response.encode_to_vec())
    }
}

/// Handlers keyed by fully-qualified method string (`package.Service.Method`)
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn MethodHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; returns true when it replaced an existing one
    pub fn register(&self, method: impl Into<String>, handler: impl MethodHandler + 'static) -> bool {
        self.handlers
            .insert(method.into(), Arc::new(handler))
            .is_some()
    }

    /// Register an async closure over raw payload bytes
    pub fn register_fn<F, Fut>(&self, method: impl Into<String>, func: F) -> bool
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Vec<u8>>> + Send + 'static,
    {
        self.register(method, FnHandler(func))
    }

    /// Register an async closure over decoded protobuf messages
    pub fn register_message<Req, Resp, F, Fut>(&self, method: impl Into<String>, func: F) -> bool
    where
        Req: prost::Message + Default + 'static,
        Resp: prost::Message + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Resp>> + Send + 'static,
    {
        self.register(
            method,
            MessageHandler {
                func,
                _request: std::marker::PhantomData,
            },
        )
    }

    pub fn unregister(&self, method: &str) -> bool {
        self.handlers.remove(method).is_some()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method strings, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        methods.sort();
        methods
    }

    /// Run the handler for a complete request and build its response
    ///
    /// Unknown methods and handler failures become error responses carrying
    /// the request's ID and method.
    pub async fn dispatch(&self, request: RpcEnvelope) -> RpcEnvelope {
        let handler = self
            .handlers
            .get(request.method())
            .map(|entry| Arc::clone(entry.value()));

        let Some(handler) = handler else {
            let err = RpcError::UnknownMethod(request.method().to_string());
            warn!(
                request_id = %request.request_id(),
                method = %request.method(),
                "no handler registered"
            );
            return RpcEnvelope::reply_error(&request, err.to_string());
        };

        let request_id = request.request_id().to_string();
        let method = request.method().to_string();
        match handler.handle(request.into_payload()).await {
            Ok(payload) => {
                debug!(%request_id, %method, bytes = payload.len(), "handler succeeded");
                RpcEnvelope::success_response(request_id, method, payload)
            }
            Err(err) => {
                debug!(%request_id, %method, kind = err.kind(), error = %err, "handler failed");
                RpcEnvelope::error_response(request_id, method, err.to_string())
            }
        }
    }
}
