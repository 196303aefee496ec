//! 推送流注册表与广播的并发行为测试

use std::sync::{Arc, Mutex};
use std::time::Duration;

use application::{
    BroadcastError, JoinOutcome, MessageBroadcast, MessageSink, SinkError, StreamHub,
    StreamHubConfig,
};
use async_trait::async_trait;
use domain::{Message, MessageId, MessageText, RoomId, StreamKey};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingSink {
    received: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn texts(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn push(&self, message: &Message) -> Result<(), SinkError> {
        self.received
            .lock()
            .unwrap()
            .push(message.text.as_str().to_owned());
        Ok(())
    }
}

struct BrokenSink;

#[async_trait]
impl MessageSink for BrokenSink {
    async fn push(&self, _message: &Message) -> Result<(), SinkError> {
        Err(SinkError::Closed)
    }
}

fn room(id: &str) -> RoomId {
    RoomId::new(id)
}

fn key(value: &str) -> StreamKey {
    StreamKey::parse(value).unwrap()
}

fn message(room_id: &str, id: &str, text: &str) -> MessageBroadcast {
    MessageBroadcast::new(Message::new(
        MessageId::new(id),
        room(room_id),
        MessageText::new(text).unwrap(),
        time::OffsetDateTime::now_utc(),
    ))
}

fn spawn_join(
    hub: &Arc<StreamHub>,
    room_id: &str,
    k: &str,
    sink: Arc<dyn MessageSink>,
    ctx: CancellationToken,
) -> JoinHandle<JoinOutcome> {
    let hub = Arc::clone(hub);
    let room_id = room(room_id);
    let k = key(k);
    tokio::spawn(async move { hub.join(room_id, k, sink, ctx).await })
}

async fn wait_for_streams(hub: &StreamHub, room_id: &str, expected: usize) {
    let room_id = room(room_id);
    tokio::time::timeout(Duration::from_secs(2), async {
        while hub.active_streams(&room_id) != expected {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("streams did not reach expected count");
}

#[tokio::test]
async fn broadcast_to_empty_room_is_a_noop() {
    let hub = StreamHub::default();
    let delivered = hub.broadcast(message("empty", "m1", "anyone?")).await.unwrap();
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn leave_on_absent_key_is_a_noop() {
    let hub = StreamHub::default();
    assert!(!hub.leave(&room("general"), &key("ghost")));
    assert!(hub.registry().is_empty());
}

#[tokio::test]
async fn double_leave_closes_once() {
    let hub = Arc::new(StreamHub::default());
    let join = spawn_join(
        &hub,
        "general",
        "k1",
        Arc::new(RecordingSink::default()),
        CancellationToken::new(),
    );
    wait_for_streams(&hub, "general", 1).await;

    let stream = hub.registry().get(&room("general"), &key("k1")).unwrap();
    assert!(hub.leave(&room("general"), &key("k1")));
    // 第二次调用可能在清理前后到达，都不能阻塞或出错
    hub.leave(&room("general"), &key("k1"));

    assert_eq!(join.await.unwrap(), JoinOutcome::Left);
    assert_eq!(stream.state(), application::StreamState::Closed);
    assert!(hub.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn leave_racing_disconnect_cleans_up_exactly_once() {
    let hub = Arc::new(StreamHub::default());

    for round in 0..50 {
        let k = format!("k{round}");
        let ctx = CancellationToken::new();
        let join = spawn_join(
            &hub,
            "general",
            &k,
            Arc::new(RecordingSink::default()),
            ctx.clone(),
        );
        wait_for_streams(&hub, "general", 1).await;

        let leave = {
            let hub = Arc::clone(&hub);
            let k = key(&k);
            tokio::spawn(async move { hub.leave(&room("general"), &k) })
        };
        let cancel = tokio::spawn(async move { ctx.cancel() });

        let outcome = join.await.unwrap();
        let _ = leave.await.unwrap();
        cancel.await.unwrap();

        assert!(matches!(
            outcome,
            JoinOutcome::Left | JoinOutcome::Disconnected
        ));
        assert_eq!(hub.active_streams(&room("general")), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_broken_sink_does_not_block_the_others() {
    let hub = Arc::new(StreamHub::default());
    let ctx = CancellationToken::new();
    let healthy: Vec<Arc<RecordingSink>> =
        (0..4).map(|_| Arc::new(RecordingSink::default())).collect();

    for (i, sink) in healthy.iter().enumerate() {
        spawn_join(
            &hub,
            "general",
            &format!("ok-{i}"),
            Arc::clone(sink) as Arc<dyn MessageSink>,
            ctx.clone(),
        );
    }
    spawn_join(&hub, "general", "broken", Arc::new(BrokenSink), ctx.clone());
    wait_for_streams(&hub, "general", 5).await;

    let err = hub
        .broadcast(message("general", "m1", "hello"))
        .await
        .unwrap_err();

    let BroadcastError::Delivery {
        key: failed_key,
        failed,
        attempted,
        ..
    } = err
    else {
        panic!("expected a delivery error, got {err:?}");
    };
    assert_eq!(failed_key, key("broken"));
    assert_eq!((failed, attempted), (1, 5));
    for sink in &healthy {
        assert_eq!(sink.texts(), ["hello"]);
    }

    ctx.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn broadcasts_stay_within_their_room() {
    let hub = Arc::new(StreamHub::default());
    let ctx = CancellationToken::new();
    let in_a = Arc::new(RecordingSink::default());
    let in_b = Arc::new(RecordingSink::default());

    spawn_join(&hub, "a", "k1", Arc::clone(&in_a) as Arc<dyn MessageSink>, ctx.clone());
    spawn_join(&hub, "b", "k1", Arc::clone(&in_b) as Arc<dyn MessageSink>, ctx.clone());
    wait_for_streams(&hub, "a", 1).await;
    wait_for_streams(&hub, "b", 1).await;

    assert_eq!(hub.broadcast(message("a", "m1", "for a")).await.unwrap(), 1);

    assert_eq!(in_a.texts(), ["for a"]);
    assert!(in_b.texts().is_empty());

    ctx.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_joins_sends_and_leaves_settle_cleanly() {
    let hub = Arc::new(StreamHub::default());
    let ctx = CancellationToken::new();
    let sinks: Vec<Arc<RecordingSink>> =
        (0..32).map(|_| Arc::new(RecordingSink::default())).collect();

    let joins: Vec<_> = sinks
        .iter()
        .enumerate()
        .map(|(i, sink)| {
            spawn_join(
                &hub,
                "busy",
                &format!("k{i}"),
                Arc::clone(sink) as Arc<dyn MessageSink>,
                ctx.clone(),
            )
        })
        .collect();
    wait_for_streams(&hub, "busy", 32).await;

    let sends: Vec<_> = (0..16)
        .map(|n| {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                hub.broadcast(message("busy", &format!("m{n}"), &format!("msg {n}")))
                    .await
            })
        })
        .collect();
    let leaves: Vec<_> = (0..16)
        .map(|i| {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.leave(&room("busy"), &key(&format!("k{i}"))) })
        })
        .collect();

    for result in futures::future::join_all(sends).await {
        result.unwrap().unwrap();
    }
    for result in futures::future::join_all(leaves).await {
        assert!(result.unwrap());
    }

    ctx.cancel();
    for join in futures::future::join_all(joins).await {
        join.unwrap();
    }

    assert!(hub.registry().is_empty());
    // 没有被离开的流收到了全部消息
    for sink in &sinks[16..] {
        assert_eq!(sink.texts().len(), 16);
    }
}

#[tokio::test]
async fn short_push_timeout_is_respected() {
    struct SlowSink;

    #[async_trait]
    impl MessageSink for SlowSink {
        async fn push(&self, _message: &Message) -> Result<(), SinkError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }
    }

    let hub = Arc::new(StreamHub::new(StreamHubConfig {
        push_timeout: Duration::from_millis(20),
    }));
    let ctx = CancellationToken::new();
    spawn_join(&hub, "general", "slow", Arc::new(SlowSink), ctx.clone());
    wait_for_streams(&hub, "general", 1).await;

    let started = std::time::Instant::now();
    let result = hub.broadcast(message("general", "m1", "hi")).await;
    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(5));

    ctx.cancel();
}
