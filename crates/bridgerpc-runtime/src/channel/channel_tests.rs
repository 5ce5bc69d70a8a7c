#![allow(non_snake_case)]

use super::*;
use tokio::sync::mpsc;

/// Transport that keeps every outbound frame for inspection
#[derive(Clone, Default)]
struct RecordingTransport {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingTransport {
    fn envelopes(&self) -> Vec<RpcEnvelope> {
        let codec = JsonCodec::new();
        self.frames
            .lock()
            .iter()
            .map(|frame| codec.decode(frame).unwrap())
            .collect()
    }

    fn frame_sizes(&self) -> Vec<usize> {
        self.frames.lock().iter().map(Vec::len).collect()
    }

    async fn wait_for(&self, count: usize) {
        for _ in 0..10_000 {
            if self.frames.lock().len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} frames, got {}", self.frames.lock().len());
    }
}

impl Transport for RecordingTransport {
    fn send(&self, frame: Vec<u8>) -> RpcResult<()> {
        self.frames.lock().push(frame);
        Ok(())
    }
}

fn encode(envelope: &RpcEnvelope) -> Vec<u8> {
    JsonCodec::new().encode(envelope).unwrap()
}

/// Two channels wired back to back through in-memory queues
fn connected_pair(config: ChannelConfig) -> (RpcChannel, RpcChannel) {
    let (to_server, mut from_client) = mpsc::unbounded_channel::<Vec<u8>>();
    let (to_client, mut from_server) = mpsc::unbounded_channel::<Vec<u8>>();

    let client = RpcChannel::new(
        move |frame: Vec<u8>| {
            to_server
                .send(frame)
                .map_err(|_| RpcError::TransportError("server gone".to_string()))
        },
        config.clone(),
    )
    .unwrap();
    let server = RpcChannel::new(
        move |frame: Vec<u8>| {
            to_client
                .send(frame)
                .map_err(|_| RpcError::TransportError("client gone".to_string()))
        },
        config,
    )
    .unwrap();

    let inbound = server.clone();
    tokio::spawn(async move {
        while let Some(frame) = from_client.recv().await {
            inbound.handle_inbound(&frame);
        }
    });
    let inbound = client.clone();
    tokio::spawn(async move {
        while let Some(frame) = from_server.recv().await {
            inbound.handle_inbound(&frame);
        }
    });

    (client, server)
}

fn register_echo(channel: &RpcChannel) {
    channel
        .handlers()
        .register_fn("echo.Echo.Ping", |payload| async move { Ok::<_, RpcError>(payload) });
}

// Construction tests

#[test]
fn RpcChannel___new_outside_runtime___returns_runtime_error() {
    let result = RpcChannel::new(RecordingTransport::default(), ChannelConfig::default());

    assert!(matches!(result, Err(RpcError::RuntimeError(_))));
}

#[tokio::test]
async fn RpcChannel___new_with_invalid_config___returns_config_error() {
    let config = ChannelConfig::default().with_max_message_size(512);

    let result = RpcChannel::new(RecordingTransport::default(), config);

    assert!(matches!(result, Err(RpcError::ConfigError(_))));
}

// Call/response tests

#[tokio::test]
async fn RpcChannel___call___returns_handler_payload() {
    let (client, server) = connected_pair(ChannelConfig::default());
    register_echo(&server);

    let result = client.call("echo.Echo.Ping", b"ping".to_vec()).await;

    assert_eq!(result, Ok(b"ping".to_vec()));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn RpcChannel___call_unknown_method___returns_remote_error() {
    let (client, _server) = connected_pair(ChannelConfig::default());

    let result = client.call("echo.Echo.Missing", Vec::new()).await;

    assert_eq!(
        result,
        Err(RpcError::Remote("unknown method: echo.Echo.Missing".to_string()))
    );
}

#[tokio::test]
async fn RpcChannel___call_failing_handler___returns_remote_error() {
    let (client, server) = connected_pair(ChannelConfig::default());
    server.handlers().register_fn("a.B.Fail", |_| async move {
        Err::<Vec<u8>, _>(RpcError::HandlerError("no".to_string()))
    });

    let result = client.call("a.B.Fail", Vec::new()).await;

    assert_eq!(result, Err(RpcError::Remote("handler error: no".to_string())));
}

#[tokio::test]
async fn RpcChannel___call_message___round_trips_protobuf() {
    let (client, server) = connected_pair(ChannelConfig::default());
    server
        .handlers()
        .register_message("greet.Greeter.SayHello", |name: String| async move {
            Ok::<_, RpcError>(format!("Hello, {name}"))
        });

    let reply: String = client
        .call_message("greet.Greeter.SayHello", &"World".to_string())
        .await
        .unwrap();

    assert_eq!(reply, "Hello, World");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn RpcChannel___concurrent_calls___resolve_to_their_own_responses() {
    let (client, server) = connected_pair(ChannelConfig::default());
    register_echo(&server);

    let calls: Vec<_> = (0u32..64)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                let payload = i.to_be_bytes().to_vec();
                (payload.clone(), client.call("echo.Echo.Ping", payload).await)
            })
        })
        .collect();

    for call in calls {
        let (sent, received) = call.await.unwrap();
        assert_eq!(received, Ok(sent));
    }
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn RpcChannel___large_payload___is_chunked_both_ways() {
    let (client, server) = connected_pair(ChannelConfig::default());
    register_echo(&server);
    let payload: Vec<u8> = (0..300_000).map(|i| (i % 253) as u8).collect();

    let result = client.call("echo.Echo.Ping", payload.clone()).await;

    assert_eq!(result, Ok(payload));
    assert_eq!(server.pending_chunk_sets(), 0);
    assert_eq!(client.pending_chunk_sets(), 0);
}

// Outbound framing tests

#[tokio::test]
async fn RpcChannel___oversized_request___is_split_under_ceiling() {
    let transport = RecordingTransport::default();
    let config = ChannelConfig::default().with_max_message_size(4096);
    let chunk_size = config.chunk_size().unwrap();
    let client = RpcChannel::new(transport.clone(), config).unwrap();

    let _ = client
        .call_with_timeout("bulk.Store.Put", vec![7; 50_000], Duration::from_millis(1))
        .await;

    let envelopes = transport.envelopes();
    assert_eq!(envelopes.len(), 50_000_usize.div_ceil(chunk_size));
    assert!(transport.frame_sizes().iter().all(|size| *size <= 4096));
    let set_id = &envelopes[0].chunk_info().unwrap().chunk_set_id;
    for (index, envelope) in envelopes.iter().enumerate() {
        let info = envelope.chunk_info().unwrap();
        assert_eq!(&info.chunk_set_id, set_id);
        assert_eq!(info.chunk_index as usize, index);
        assert_eq!(info.original_size, 50_000);
        assert_eq!(envelope.request_id(), envelopes[0].request_id());
    }
    assert_ne!(set_id, envelopes[0].request_id());
}

#[tokio::test]
async fn RpcChannel___small_request___is_sent_unchunked() {
    let transport = RecordingTransport::default();
    let client = RpcChannel::new(transport.clone(), ChannelConfig::default()).unwrap();

    let _ = client
        .call_with_timeout("echo.Echo.Ping", vec![1; 100], Duration::from_millis(1))
        .await;

    let envelopes = transport.envelopes();
    assert_eq!(envelopes.len(), 1);
    assert!(envelopes[0].is_request());
    assert!(envelopes[0].chunk_info().is_none());
}

#[tokio::test]
async fn RpcChannel___oversized_error___is_truncated_into_one_frame() {
    let transport = RecordingTransport::default();
    let config = ChannelConfig::default().with_max_message_size(2048);
    let server = RpcChannel::new(transport.clone(), config).unwrap();
    server.handlers().register_fn("a.B.Fail", |_| async move {
        Err::<Vec<u8>, _>(RpcError::HandlerError("x".repeat(10_000)))
    });

    server.handle_inbound(&encode(&RpcEnvelope::request("req-1", "a.B.Fail", Vec::new())));
    transport.wait_for(1).await;

    let envelopes = transport.envelopes();
    assert_eq!(envelopes.len(), 1);
    assert!(envelopes[0].chunk_info().is_none());
    assert!(envelopes[0].error().unwrap().starts_with("handler error: xxx"));
    assert!(transport.frame_sizes()[0] <= 2048);
}

#[tokio::test]
async fn RpcChannel___escape_heavy_error___is_truncated_under_default_ceiling() {
    let transport = RecordingTransport::default();
    let server = RpcChannel::new(transport.clone(), ChannelConfig::default()).unwrap();
    server.handlers().register_fn("a.B.Fail", |_| async move {
        Err::<Vec<u8>, _>(RpcError::HandlerError("\"\n".repeat(50_000)))
    });

    server.handle_inbound(&encode(&RpcEnvelope::request("req-1", "a.B.Fail", Vec::new())));
    transport.wait_for(1).await;

    let sizes = transport.frame_sizes();
    assert_eq!(sizes.len(), 1);
    assert!(sizes[0] <= 65_536, "frame sizes = {sizes:?}");
    let envelopes = transport.envelopes();
    assert_eq!(envelopes[0].request_id(), "req-1");
    assert!(envelopes[0].error().unwrap().starts_with("handler error: \"\n"));
}

#[tokio::test]
async fn RpcChannel___long_method___chunks_stay_under_ceiling() {
    let transport = RecordingTransport::default();
    let config = ChannelConfig::default().with_max_message_size(2048);
    let client = RpcChannel::new(transport.clone(), config).unwrap();
    let method = format!("pkg.Svc.{}", "M".repeat(1200));

    let _ = client
        .call_with_timeout(&method, vec![5; 10_000], Duration::from_millis(1))
        .await;

    let sizes = transport.frame_sizes();
    assert!(sizes.len() > 1);
    assert!(sizes.iter().all(|size| *size <= 2048), "frame sizes = {sizes:?}");
    let mut assembler = ChunkAssembler::default();
    let mut outcomes: Vec<ChunkOutcome> = transport
        .envelopes()
        .into_iter()
        .map(|envelope| assembler.accept(envelope))
        .collect();
    match outcomes.pop() {
        Some(ChunkOutcome::Complete(request)) => {
            assert_eq!(request.method(), method);
            assert_eq!(request.payload(), vec![5; 10_000].as_slice());
        }
        other => panic!("expected the reassembled request, got {other:?}"),
    }
}

#[tokio::test]
async fn RpcChannel___method_too_long_for_any_chunk___fails_the_call() {
    let transport = RecordingTransport::default();
    let config = ChannelConfig::default().with_max_message_size(2048);
    let client = RpcChannel::new(transport.clone(), config).unwrap();

    let result = client.call(&"m".repeat(3000), vec![1; 10]).await;

    assert!(matches!(result, Err(RpcError::SerializationError(_))));
    assert!(transport.frame_sizes().is_empty());
    assert_eq!(client.pending_calls(), 0);
}

// Timeout and cancellation tests

#[tokio::test(start_paused = true)]
async fn RpcChannel___no_response___times_out_and_clears_entry() {
    let transport = RecordingTransport::default();
    let client = RpcChannel::new(transport, ChannelConfig::default()).unwrap();

    let result = client
        .call_with_timeout("echo.Echo.Ping", Vec::new(), Duration::from_millis(250))
        .await;

    assert_eq!(result, Err(RpcError::Timeout));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn RpcChannel___late_response___is_ignored() {
    let transport = RecordingTransport::default();
    let client = RpcChannel::new(transport.clone(), ChannelConfig::default()).unwrap();
    let _ = client
        .call_with_timeout("echo.Echo.Ping", Vec::new(), Duration::from_millis(10))
        .await;
    let request = transport.envelopes().remove(0);

    client.handle_inbound(&encode(&RpcEnvelope::reply(&request, vec![1])));

    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn RpcChannel___dropped_call___clears_entry() {
    let transport = RecordingTransport::default();
    let client = RpcChannel::new(transport.clone(), ChannelConfig::default()).unwrap();

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.call("echo.Echo.Ping", Vec::new()).await }
    });
    transport.wait_for(1).await;
    assert_eq!(client.pending_calls(), 1);

    call.abort();
    let _ = call.await;

    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn RpcChannel___close___fails_pending_and_new_calls() {
    let transport = RecordingTransport::default();
    let client = RpcChannel::new(transport.clone(), ChannelConfig::default()).unwrap();
    let call = tokio::spawn({
        let client = client.clone();
        async move { client.call("echo.Echo.Ping", Vec::new()).await }
    });
    transport.wait_for(1).await;

    client.close();

    assert_eq!(call.await.unwrap(), Err(RpcError::ChannelClosed));
    assert_eq!(
        client.call("echo.Echo.Ping", Vec::new()).await,
        Err(RpcError::ChannelClosed)
    );
    assert!(client.is_closed());
}

// Inbound robustness tests

#[tokio::test]
async fn RpcChannel___malformed_frame___is_dropped() {
    let (client, server) = connected_pair(ChannelConfig::default());
    register_echo(&server);

    server.handle_inbound(b"{not json");
    server.handle_inbound(br#"{"requestId":"","isRequest":true,"method":"m"}"#);

    assert_eq!(client.call("echo.Echo.Ping", vec![3]).await, Ok(vec![3]));
}

#[tokio::test]
async fn RpcChannel___corrupted_response_set___fails_only_that_call() {
    let transport = RecordingTransport::default();
    let client = RpcChannel::new(transport.clone(), ChannelConfig::default()).unwrap();
    let spawn_call = |client: RpcChannel| {
        tokio::spawn(async move { client.call("echo.Echo.Ping", Vec::new()).await })
    };
    let victim = spawn_call(client.clone());
    transport.wait_for(1).await;
    let bystander = spawn_call(client.clone());
    transport.wait_for(2).await;
    let requests = transport.envelopes();

    let good = split_envelope(&RpcEnvelope::reply(&requests[0], vec![1; 20]), 10, "set-1");
    let bad = split_envelope(&RpcEnvelope::reply(&requests[0], vec![2; 20]), 10, "set-1");
    client.handle_inbound(&encode(&good[0]));
    client.handle_inbound(&encode(&bad[0]));
    client.handle_inbound(&encode(&RpcEnvelope::reply(&requests[1], vec![9])));

    assert!(matches!(
        victim.await.unwrap(),
        Err(RpcError::ProtocolCorruption(_))
    ));
    assert_eq!(bystander.await.unwrap(), Ok(vec![9]));
}

#[tokio::test]
async fn RpcChannel___colliding_chunk_from_other_call___fails_the_set_owner() {
    let transport = RecordingTransport::default();
    let client = RpcChannel::new(transport.clone(), ChannelConfig::default()).unwrap();
    let owner = {
        let client = client.clone();
        tokio::spawn(async move { client.call("echo.Echo.Ping", Vec::new()).await })
    };
    transport.wait_for(1).await;
    let request = transport.envelopes().remove(0);

    let owned = split_envelope(&RpcEnvelope::reply(&request, vec![1; 20]), 10, "set-1");
    let intruder = split_envelope(
        &RpcEnvelope::success_response("someone-else", "echo.Echo.Ping", vec![2; 20]),
        10,
        "set-1",
    );
    client.handle_inbound(&encode(&owned[0]));
    client.handle_inbound(&encode(&intruder[1]));

    assert!(matches!(
        owner.await.unwrap(),
        Err(RpcError::ProtocolCorruption(_))
    ));
    assert_eq!(client.pending_chunk_sets(), 0);
}

#[tokio::test]
async fn RpcChannel___corrupted_request_set___answers_with_error() {
    let transport = RecordingTransport::default();
    let server = RpcChannel::new(transport.clone(), ChannelConfig::default()).unwrap();
    register_echo(&server);
    let request = RpcEnvelope::request("req-7", "echo.Echo.Ping", vec![1; 30]);
    let chunks = split_envelope(&request, 10, "set-7");
    let liar = split_envelope(
        &RpcEnvelope::request("req-7", "echo.Echo.Ping", vec![1; 40]),
        10,
        "set-7",
    );

    server.handle_inbound(&encode(&chunks[0]));
    server.handle_inbound(&encode(&liar[1]));
    transport.wait_for(1).await;

    let response = transport.envelopes().remove(0);
    assert_eq!(response.request_id(), "req-7");
    assert!(!response.is_request());
    assert!(response.error().unwrap().starts_with("protocol corruption"));
    assert_eq!(server.pending_chunk_sets(), 0);
}

#[tokio::test]
async fn RpcChannel___sweeper___evicts_stale_chunk_sets() {
    let config = ChannelConfig::default().with_reassembly_timeout(Duration::from_millis(50));
    let server = RpcChannel::new(RecordingTransport::default(), config).unwrap();
    let chunks = split_envelope(
        &RpcEnvelope::request("req-1", "echo.Echo.Ping", vec![1; 30]),
        10,
        "set-1",
    );
    server.handle_inbound(&encode(&chunks[0]));
    assert_eq!(server.pending_chunk_sets(), 1);

    let sweeper = server.start_sweeper(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(server.pending_chunk_sets(), 0);
    server.close();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sweeper.is_finished());
}
