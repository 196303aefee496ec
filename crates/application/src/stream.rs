//! 单个推送流的状态与生命周期
//!
//! 一个 [`ChatStream`] 对应一次 JoinRoom 调用在某个房间下打开的服务端推送通道。
//! 生命周期为 `Pending → Active → Closed`，关闭信号是一次性的取消令牌，
//! 可以被多次触发，也可以在没有等待者时触发。

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use domain::{Message, RoomId, StreamKey};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// 推送失败原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// 底层连接已经关闭
    #[error("stream sink is closed")]
    Closed,
    /// 在限定时间内未能写入
    #[error("push timed out after {0:?}")]
    TimedOut(Duration),
}

/// 与底层连接绑定、可以推送消息的句柄。
///
/// 传输层只需要实现这一个方法，核心逻辑不关心消息如何编码和发送。
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn push(&self, message: &Message) -> Result<(), SinkError>;
}

/// 推送流状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// 已分配，尚未发布到注册表
    Pending,
    /// 已发布，可以接收广播
    Active,
    /// 终态，已从注册表移除
    Closed,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StreamState::Pending,
            1 => StreamState::Active,
            _ => StreamState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            StreamState::Pending => 0,
            StreamState::Active => 1,
            StreamState::Closed => 2,
        }
    }
}

/// 关闭信号的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// 客户端调用 LeaveRoom
    Left,
    /// 同一口令再次加入，旧流被顶替
    Replaced,
}

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

pub struct ChatStream {
    serial: u64,
    room_id: RoomId,
    key: StreamKey,
    sink: Arc<dyn MessageSink>,
    close: CancellationToken,
    close_reason: OnceLock<CloseReason>,
    state: AtomicU8,
}

impl ChatStream {
    /// 创建处于 `Pending` 状态的推送流
    pub fn new(room_id: RoomId, key: StreamKey, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            room_id,
            key,
            sink,
            close: CancellationToken::new(),
            close_reason: OnceLock::new(),
            state: AtomicU8::new(StreamState::Pending.as_u8()),
        }
    }

    /// 进程内唯一的序号，用于区分同一 `(room_id, key)` 上先后注册的流
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// 第一次触发关闭时记录的原因
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get().copied()
    }

    /// 触发关闭信号。
    ///
    /// 可以重复调用；只有第一次调用的原因会被记录，返回值表示本次调用是否为第一次。
    pub fn close(&self, reason: CloseReason) -> bool {
        let first = self.close_reason.set(reason).is_ok();
        self.close.cancel();
        first
    }

    pub fn is_close_signalled(&self) -> bool {
        self.close.is_cancelled()
    }

    /// 等待关闭信号
    pub async fn closed(&self) {
        self.close.cancelled().await
    }

    /// 推送一条消息到底层连接
    pub async fn push(&self, message: &Message) -> Result<(), SinkError> {
        self.sink.push(message).await
    }

    /// `Pending → Active`
    pub(crate) fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                StreamState::Pending.as_u8(),
                StreamState::Active.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// 进入终态，只有第一次调用返回 `true`
    pub(crate) fn mark_closed(&self) -> bool {
        self.state.swap(StreamState::Closed.as_u8(), Ordering::AcqRel) != StreamState::Closed.as_u8()
    }
}

impl fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatStream")
            .field("serial", &self.serial)
            .field("room_id", &self.room_id)
            .field("key", &self.key)
            .field("state", &self.state())
            .field("close_reason", &self.close_reason())
            .finish_non_exhaustive()
    }
}
