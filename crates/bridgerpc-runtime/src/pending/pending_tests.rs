#![allow(non_snake_case)]

use super::*;
use std::collections::HashSet;

// PendingCalls tests

#[test]
fn PendingCalls___register___allocates_unique_ids() {
    let calls = PendingCalls::new();

    let ids: HashSet<String> = (0..500).map(|_| calls.register().0).collect();

    assert_eq!(ids.len(), 500);
    assert_eq!(calls.len(), 500);
}

#[tokio::test]
async fn PendingCalls___complete___delivers_outcome_to_receiver() {
    let calls = PendingCalls::new();
    let (id, receiver) = calls.register();

    assert!(calls.complete(&id, Ok(vec![1, 2])));

    assert_eq!(receiver.await.unwrap(), Ok(vec![1, 2]));
    assert!(calls.is_empty());
}

#[test]
fn PendingCalls___complete_unknown_id___returns_false() {
    let calls = PendingCalls::new();

    assert!(!calls.complete("nope", Ok(Vec::new())));
}

#[test]
fn PendingCalls___complete_twice___second_is_ignored() {
    let calls = PendingCalls::new();
    let (id, _receiver) = calls.register();

    assert!(calls.complete(&id, Ok(Vec::new())));
    assert!(!calls.complete(&id, Ok(Vec::new())));
}

#[test]
fn PendingCalls___complete_after_receiver_dropped___returns_false() {
    let calls = PendingCalls::new();
    let (id, receiver) = calls.register();
    drop(receiver);

    assert!(!calls.complete(&id, Ok(Vec::new())));
    assert!(!calls.contains(&id));
}

#[tokio::test]
async fn PendingCalls___fail_all___fails_every_waiter() {
    let calls = PendingCalls::new();
    let (_, first) = calls.register();
    let (_, second) = calls.register();

    let failed = calls.fail_all(&RpcError::ChannelClosed);

    assert_eq!(failed, 2);
    assert_eq!(first.await.unwrap(), Err(RpcError::ChannelClosed));
    assert_eq!(second.await.unwrap(), Err(RpcError::ChannelClosed));
    assert!(calls.is_empty());
}

// PendingGuard tests

#[test]
fn PendingGuard___drop___removes_entry() {
    let calls = Arc::new(PendingCalls::new());
    let (id, _receiver) = calls.register();

    {
        let guard = PendingGuard::new(Arc::clone(&calls), id.clone());
        assert_eq!(guard.request_id(), id);
        assert!(calls.contains(&id));
    }

    assert!(!calls.contains(&id));
}

#[test]
fn PendingGuard___drop_after_completion___is_harmless() {
    let calls = Arc::new(PendingCalls::new());
    let (id, _receiver) = calls.register();
    let guard = PendingGuard::new(Arc::clone(&calls), id.clone());

    calls.complete(&id, Ok(Vec::new()));
    drop(guard);

    assert!(calls.is_empty());
}
