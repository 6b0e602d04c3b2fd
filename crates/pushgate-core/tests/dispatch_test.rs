//! DispatchPipeline tests
//!
//! Session verification, error replies, id assignment and publish failover
//! across queue instances.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use pushgate_core::{
    Connection, DispatchAction, DispatchEnvelope, DispatchPipeline, EventBus, FailoverInvoker,
    FailoverPolicy, IdGen, MemoryCache, NodeAddress, QueueClient, QueuePool, RouterCenter,
    SequenceIdGen, Topic, dispatch::NOT_BOUND_REASON,
};
use pushgate_harness::{FailMode, FailingIdGen, MemoryConnection, RecordingQueue};
use pushgate_proto::{Command, ErrorCode, ErrorPayload, Frame, FrameHeader};

struct Fixture {
    router: Arc<RouterCenter>,
    queues: Vec<Arc<RecordingQueue>>,
    pipeline: DispatchPipeline,
}

fn fixture_with(instances: usize, attempts: u32, id_gen: Arc<dyn IdGen>) -> Fixture {
    let router = Arc::new(RouterCenter::new(
        NodeAddress::new("10.0.0.1", 3000),
        Arc::new(MemoryCache::new()),
        EventBus::new(8),
        None,
    ));
    let queues: Vec<_> = (0..instances).map(|i| RecordingQueue::new(format!("q{i}"))).collect();
    let clients = queues.iter().map(|q| Arc::clone(q) as Arc<dyn QueueClient>).collect();
    let pool = QueuePool::new(clients).unwrap();
    let invoker = FailoverInvoker::new(FailoverPolicy {
        max_attempts: attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
    });
    let pipeline = DispatchPipeline::new(router.clone(), id_gen, pool, invoker);
    Fixture { router, queues, pipeline }
}

fn fixture(instances: usize, attempts: u32) -> Fixture {
    fixture_with(instances, attempts, Arc::new(SequenceIdGen::new()))
}

fn dispatch_frame(sequence: i32, payload: &'static [u8]) -> Frame {
    let mut header = FrameHeader::new(Command::Dispatch);
    header.set_sequence(sequence);
    Frame::new(header, Bytes::from_static(payload))
}

fn published_envelopes(queues: &[Arc<RecordingQueue>]) -> Vec<DispatchEnvelope> {
    queues
        .iter()
        .flat_map(|q| q.published())
        .map(|(topic, bytes)| {
            assert_eq!(topic, Topic::DispatchMessage);
            DispatchEnvelope::decode(bytes).unwrap()
        })
        .collect()
}

#[tokio::test]
async fn unbound_connection_gets_error_then_close() {
    let f = fixture(2, 3);
    let conn = MemoryConnection::new();

    let actions = f.pipeline.handle(&*conn, dispatch_frame(7, b"hello")).await;

    assert_eq!(actions.len(), 2);
    let DispatchAction::SendFrame(reply) = &actions[0] else {
        panic!("expected error reply first, got {actions:?}");
    };
    assert_eq!(reply.header.command_enum(), Some(Command::Error));
    assert_eq!(reply.header.sequence(), 7);
    let body = ErrorPayload::decode(&reply.payload).unwrap();
    assert_eq!(body.code, ErrorCode::NotBound);
    assert_eq!(body.reason, NOT_BOUND_REASON);
    assert!(matches!(actions[1], DispatchAction::Close { .. }));

    assert!(f.queues.iter().all(|q| q.attempts() == 0));
}

#[tokio::test]
async fn session_user_without_local_router_is_unbound() {
    let f = fixture(1, 1);
    let conn = MemoryConnection::bound("alice", 1);

    let actions = f.pipeline.handle(&*conn, dispatch_frame(1, b"x")).await;

    assert_eq!(actions.len(), 2);
    assert_eq!(f.queues[0].attempts(), 0);
}

#[tokio::test]
async fn superseded_connection_is_unbound() {
    let f = fixture(1, 1);
    let old = MemoryConnection::bound("alice", 1);
    let new = MemoryConnection::bound("alice", 1);
    f.router.register("alice", old.as_ref_dyn()).await;
    f.router.register("alice", new.as_ref_dyn()).await;

    let actions = f.pipeline.handle(&*old, dispatch_frame(1, b"x")).await;
    assert!(matches!(actions.last(), Some(DispatchAction::Close { .. })));

    let actions = f.pipeline.handle(&*new, dispatch_frame(2, b"y")).await;
    assert!(actions.is_empty());
    assert_eq!(f.queues[0].published().len(), 1);
}

#[tokio::test]
async fn non_dispatch_command_closes_without_reply() {
    let f = fixture(1, 1);
    let conn = MemoryConnection::bound("alice", 1);
    f.router.register("alice", conn.as_ref_dyn()).await;

    for header in [FrameHeader::new(Command::Heartbeat), FrameHeader::with_raw_command(0x7f)] {
        let actions = f.pipeline.handle(&*conn, Frame::new(header, Bytes::new())).await;
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], DispatchAction::Close { .. }));
    }
    assert_eq!(f.queues[0].attempts(), 0);
}

#[tokio::test]
async fn bound_frames_publish_in_order_with_increasing_ids() {
    let f = fixture(1, 1);
    let conn = MemoryConnection::bound("alice", 1);
    f.router.register("alice", conn.as_ref_dyn()).await;

    for (seq, payload) in [(1, &b"a"[..]), (2, &b"bb"[..]), (3, &b"ccc"[..])] {
        let actions = f.pipeline.handle(&*conn, dispatch_frame(seq, payload)).await;
        assert!(actions.is_empty());
    }

    let envelopes = published_envelopes(&f.queues);
    let payloads: Vec<_> = envelopes.iter().map(|e| e.payload.clone()).collect();
    assert_eq!(payloads, vec![&b"a"[..], &b"bb"[..], &b"ccc"[..]]);
    assert!(envelopes.windows(2).all(|w| w[0].id < w[1].id));
    assert!(conn.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failover_moves_to_next_instance() {
    let f = fixture(3, 3);
    let conn = MemoryConnection::bound("alice", 1);
    f.router.register("alice", conn.as_ref_dyn()).await;
    f.queues[0].set_mode(FailMode::Down);

    let actions = f.pipeline.handle(&*conn, dispatch_frame(1, b"x")).await;

    assert!(actions.is_empty());
    assert_eq!(f.queues[0].attempts(), 1);
    assert_eq!(f.queues[1].published().len(), 1);
    assert_eq!(f.queues[2].attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn failover_stops_at_attempt_cap() {
    let f = fixture(2, 3);
    let conn = MemoryConnection::bound("alice", 1);
    f.router.register("alice", conn.as_ref_dyn()).await;
    for q in &f.queues {
        q.set_mode(FailMode::Down);
    }

    let actions = f.pipeline.handle(&*conn, dispatch_frame(1, b"x")).await;

    assert!(actions.is_empty());
    let total: usize = f.queues.iter().map(|q| q.attempts()).sum();
    assert_eq!(total, 3);
    assert!(!conn.is_closed());
}

#[tokio::test(start_paused = true)]
async fn retries_reuse_the_same_id() {
    let f = fixture(2, 2);
    let conn = MemoryConnection::bound("alice", 1);
    f.router.register("alice", conn.as_ref_dyn()).await;
    f.queues[0].set_mode(FailMode::Down);

    f.pipeline.handle(&*conn, dispatch_frame(1, b"x")).await;

    let envelopes = published_envelopes(&f.queues);
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].id, 1);
}

#[tokio::test]
async fn non_retryable_error_is_not_retried() {
    let f = fixture(2, 5);
    let conn = MemoryConnection::bound("alice", 1);
    f.router.register("alice", conn.as_ref_dyn()).await;
    for q in &f.queues {
        q.set_mode(FailMode::Broken);
    }

    let actions = f.pipeline.handle(&*conn, dispatch_frame(1, b"x")).await;

    assert!(actions.is_empty());
    let total: usize = f.queues.iter().map(|q| q.attempts()).sum();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn id_failure_drops_frame_silently() {
    let id_gen = Arc::new(FailingIdGen::new());
    id_gen.set_down(true);
    let f = fixture_with(1, 1, id_gen.clone());
    let conn = MemoryConnection::bound("alice", 1);
    f.router.register("alice", conn.as_ref_dyn()).await;

    let actions = f.pipeline.handle(&*conn, dispatch_frame(1, b"x")).await;
    assert!(actions.is_empty());
    assert_eq!(f.queues[0].attempts(), 0);

    id_gen.set_down(false);
    f.pipeline.handle(&*conn, dispatch_frame(2, b"y")).await;
    assert_eq!(f.queues[0].published().len(), 1);
}
