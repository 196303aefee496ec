//! 推送流的加入、离开与房间内广播
//!
//! [`StreamHub`] 拥有 [`StreamRegistry`]，负责每个推送流 `Pending → Active → Closed`
//! 的状态推进，并把一条消息并发地推送给房间内的所有活跃流。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{Message, RoomId, StreamKey};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::broadcaster::{BroadcastError, MessageBroadcast, MessageBroadcaster};
use crate::stream::{ChatStream, CloseReason, MessageSink, SinkError};
use crate::stream_registry::StreamRegistry;

#[derive(Debug, Clone)]
pub struct StreamHubConfig {
    /// 单次推送的超时时间
    pub push_timeout: Duration,
}

impl Default for StreamHubConfig {
    fn default() -> Self {
        Self {
            push_timeout: Duration::from_secs(5),
        }
    }
}

/// 一次 join 结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// 连接被取消（客户端断开或服务关闭）
    Disconnected,
    /// 客户端调用了 LeaveRoom
    Left,
    /// 同一口令再次加入，当前流被顶替
    Replaced,
}

pub struct StreamHub {
    registry: Arc<StreamRegistry>,
    config: StreamHubConfig,
}

/// 已发布到注册表的推送流。
///
/// 析构时完成 `Closed` 转换并清理注册表，等待中的 future 被中途丢弃时也同样生效。
pub struct Subscription {
    registry: Arc<StreamRegistry>,
    stream: Arc<ChatStream>,
}

impl Subscription {
    pub fn stream(&self) -> &Arc<ChatStream> {
        &self.stream
    }

    /// 等待连接取消或关闭信号，返回时该流已经从注册表中移除
    pub async fn wait(self, ctx: CancellationToken) -> JoinOutcome {
        let stream = Arc::clone(&self.stream);

        let outcome = tokio::select! {
            biased;
            _ = stream.closed() => match stream.close_reason() {
                Some(CloseReason::Replaced) => JoinOutcome::Replaced,
                _ => JoinOutcome::Left,
            },
            _ = ctx.cancelled() => JoinOutcome::Disconnected,
        };

        drop(self);

        tracing::debug!(
            room_id = %stream.room_id(),
            key = ?stream.key(),
            serial = stream.serial(),
            outcome = ?outcome,
            "推送流已关闭"
        );

        outcome
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.stream.mark_closed() {
            self.registry.remove_stream(&self.stream);
        }
    }
}

impl StreamHub {
    pub fn new(config: StreamHubConfig) -> Self {
        Self {
            registry: Arc::new(StreamRegistry::new()),
            config,
        }
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn active_streams(&self, room_id: &RoomId) -> usize {
        self.registry.room_len(room_id)
    }

    /// 注册推送流并等待它结束。
    ///
    /// 调用方负责先确认房间存在。返回时该流已经从注册表中移除。
    pub async fn join(
        &self,
        room_id: RoomId,
        key: StreamKey,
        sink: Arc<dyn MessageSink>,
        ctx: CancellationToken,
    ) -> JoinOutcome {
        self.publish(room_id, key, sink).wait(ctx).await
    }

    /// 同步发布推送流，返回后该流已能收到广播。
    ///
    /// 同一 `(room_id, key)` 上的旧流会被关闭。
    pub fn publish(
        &self,
        room_id: RoomId,
        key: StreamKey,
        sink: Arc<dyn MessageSink>,
    ) -> Subscription {
        let stream = Arc::new(ChatStream::new(room_id, key, sink));
        stream.activate();
        if let Some(displaced) = self.registry.add(Arc::clone(&stream)) {
            tracing::info!(
                room_id = %displaced.room_id(),
                key = ?displaced.key(),
                serial = displaced.serial(),
                "同一口令再次加入，关闭旧的推送流"
            );
            displaced.close(CloseReason::Replaced);
        }

        tracing::debug!(
            room_id = %stream.room_id(),
            key = ?stream.key(),
            serial = stream.serial(),
            "推送流已加入房间"
        );

        Subscription {
            registry: Arc::clone(&self.registry),
            stream,
        }
    }

    /// 通知 `(room_id, key)` 上的流结束，不存在时返回 `false`
    pub fn leave(&self, room_id: &RoomId, key: &StreamKey) -> bool {
        match self.registry.get(room_id, key) {
            Some(stream) => {
                stream.close(CloseReason::Left);
                true
            }
            None => false,
        }
    }

    /// 把消息并发推送给房间内此刻的所有活跃流，等待全部推送结束。
    ///
    /// 返回成功送达的数量。任一推送失败时返回 [`BroadcastError::Delivery`]，
    /// 其他流的推送不受影响。推送在独立任务中进行，调用方的 future 被丢弃后仍会完成。
    pub async fn broadcast(&self, payload: MessageBroadcast) -> Result<usize, BroadcastError> {
        let MessageBroadcast { room_id, message } = payload;
        let streams = self.registry.snapshot(&room_id);
        if streams.is_empty() {
            return Ok(0);
        }

        let push_timeout = self.config.push_timeout;
        let delivery = tokio::spawn(deliver(room_id.clone(), streams, message, push_timeout));

        match delivery.await {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Err(join_error) => Err(BroadcastError::Interrupted {
                room_id,
                reason: join_error.to_string(),
            }),
        }
    }
}

async fn deliver(
    room_id: RoomId,
    streams: Vec<Arc<ChatStream>>,
    message: Message,
    push_timeout: Duration,
) -> Result<usize, BroadcastError> {
    let attempted = streams.len();
    let message = Arc::new(message);
    let mut tasks = JoinSet::new();
    let mut keys = HashMap::with_capacity(attempted);

    for stream in streams {
        let key = stream.key().clone();
        let message = Arc::clone(&message);
        let handle = tasks.spawn(async move {
            match tokio::time::timeout(push_timeout, stream.push(&message)).await {
                Ok(result) => result,
                Err(_) => Err(SinkError::TimedOut(push_timeout)),
            }
        });
        keys.insert(handle.id(), key);
    }

    let mut delivered = 0;
    let mut failures: Vec<(StreamKey, String)> = Vec::new();

    while let Some(joined) = tasks.join_next_with_id().await {
        let (id, reason) = match joined {
            Ok((_, Ok(()))) => {
                delivered += 1;
                continue;
            }
            Ok((id, Err(error))) => (id, error.to_string()),
            Err(join_error) => (join_error.id(), join_error.to_string()),
        };
        if let Some(key) = keys.remove(&id) {
            tracing::warn!(room_id = %room_id, key = ?key, reason = %reason, "消息推送失败");
            failures.push((key, reason));
        }
    }

    let failed = failures.len();
    match failures.into_iter().next() {
        None => Ok(delivered),
        Some((key, reason)) => Err(BroadcastError::Delivery {
            room_id,
            key,
            reason,
            failed,
            attempted,
        }),
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new(StreamHubConfig::default())
    }
}

#[async_trait]
impl MessageBroadcaster for StreamHub {
    async fn broadcast(&self, payload: MessageBroadcast) -> Result<usize, BroadcastError> {
        StreamHub::broadcast(self, payload).await
    }
}
