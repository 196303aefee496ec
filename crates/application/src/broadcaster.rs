use async_trait::async_trait;
use domain::{Message, RoomId, StreamKey};
use thiserror::Error;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageBroadcast {
    pub room_id: RoomId,
    pub message: Message,
}

impl MessageBroadcast {
    /// 以消息所属房间为目标
    pub fn new(message: Message) -> Self {
        Self {
            room_id: message.room_id.clone(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    /// 至少一个推送流没有收到消息，其余推送不受影响
    #[error(
        "failed to deliver to {failed}/{attempted} streams in room {room_id}, first failure {key:?}: {reason}"
    )]
    Delivery {
        room_id: RoomId,
        key: StreamKey,
        reason: String,
        failed: usize,
        attempted: usize,
    },

    /// 推送任务在完成前被运行时取消
    #[error("delivery to room {room_id} was interrupted: {reason}")]
    Interrupted { room_id: RoomId, reason: String },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageBroadcaster: Send + Sync {
    /// 推送给房间内所有活跃流，返回成功送达的数量
    async fn broadcast(&self, payload: MessageBroadcast) -> Result<usize, BroadcastError>;
}
