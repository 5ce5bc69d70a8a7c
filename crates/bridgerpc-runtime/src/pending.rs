//! Pending-call table for request/response correlation

use bridgerpc_core::{RpcError, RpcResult};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Outcome delivered to a waiting caller
pub type CallOutcome = RpcResult<Vec<u8>>;

/// Outstanding calls keyed by request ID
///
/// Every registered ID is unique among the entries currently in the table.
#[derive(Default)]
pub struct PendingCalls {
    calls: DashMap<String, oneshot::Sender<CallOutcome>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new call under a fresh request ID
    pub fn register(&self) -> (String, oneshot::Receiver<CallOutcome>) {
        loop {
            let request_id = Uuid::new_v4().to_string();
            if let Entry::Vacant(slot) = self.calls.entry(request_id.clone()) {
                let (sender, receiver) = oneshot::channel();
                slot.insert(sender);
                return (request_id, receiver);
            }
        }
    }

    /// Resolve a call; false when no call with this ID is outstanding
    pub fn complete(&self, request_id: &str, outcome: CallOutcome) -> bool {
        match self.calls.remove(request_id) {
            // The caller may have stopped waiting between remove and send
            Some((_, sender)) => sender.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Forget a call without resolving it
    pub fn remove(&self, request_id: &str) -> bool {
        self.calls.remove(request_id).is_some()
    }

    /// Fail every outstanding call with `error`; returns how many were failed
    pub fn fail_all(&self, error: &RpcError) -> usize {
        let ids: Vec<String> = self.calls.iter().map(|entry| entry.key().clone()).collect();
        ids.iter()
            .filter(|id| self.complete(id, Err(error.clone())))
            .count()
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.calls.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Removes a pending call when dropped
///
/// Held by the calling future so that a timed-out or abandoned call leaves no
/// entry behind and a late response finds nothing to resolve.
pub struct PendingGuard {
    calls: Arc<PendingCalls>,
    request_id: String,
}

impl PendingGuard {
    pub fn new(calls: Arc<PendingCalls>, request_id: impl Into<String>) -> Self {
        Self {
            calls,
            request_id: request_id.into(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.calls.remove(&self.request_id);
    }
}

#[cfg(test)]
#[path = "pending/pending_tests.rs"]
mod pending_tests;
