use std::sync::Arc;

use domain::{ChatRoom, DomainError, Message, MessageId, MessageText, RoomId, StreamKey};
use tokio_util::sync::CancellationToken;

use crate::{
    broadcaster::{MessageBroadcast, MessageBroadcaster},
    clock::Clock,
    error::ApplicationError,
    id_generator::IdGenerator,
    repository::{ChatRoomRepository, MessageRepository},
    stream::MessageSink,
    stream_hub::{JoinOutcome, StreamHub, Subscription},
};

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub room_id: RoomId,
    pub text: String,
}

pub struct ChatServiceDependencies {
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub id_generator: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
    pub streams: Arc<StreamHub>,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    pub fn streams(&self) -> &Arc<StreamHub> {
        &self.deps.streams
    }

    async fn require_room(&self, room_id: &RoomId) -> Result<ChatRoom, ApplicationError> {
        self.deps
            .room_repository
            .select(room_id)
            .await?
            .ok_or_else(|| DomainError::room_not_found(room_id).into())
    }

    pub async fn create_room(&self, name: String) -> Result<ChatRoom, ApplicationError> {
        let id = RoomId::new(self.deps.id_generator.generate()?);
        let room = ChatRoom::new(id, name)?;
        let stored = self.deps.room_repository.insert(room).await?;

        tracing::info!(room_id = %stored.id, name = %stored.name, "聊天室已创建");
        Ok(stored)
    }

    pub async fn get_room(&self, room_id: &RoomId) -> Result<ChatRoom, ApplicationError> {
        self.require_room(room_id).await
    }

    /// 按 ID 排序，即创建顺序
    pub async fn list_rooms(&self) -> Result<Vec<ChatRoom>, ApplicationError> {
        let mut rooms = self.deps.room_repository.select_all().await?;
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rooms)
    }

    /// 生成客户端加入房间时使用的口令
    pub fn get_pass(&self) -> Result<StreamKey, ApplicationError> {
        let pass = self.deps.id_generator.generate()?;
        Ok(StreamKey::parse(pass)?)
    }

    /// 持久化消息后广播给房间内的活跃流。
    ///
    /// 广播失败时消息仍然保留，错误返回给调用方。
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        let text = MessageText::new(request.text)?;
        let room = self.require_room(&request.room_id).await?;

        let id = MessageId::new(self.deps.id_generator.generate()?);
        let message = Message::new(id, room.id, text, self.deps.clock.now());
        let stored = self.deps.message_repository.insert(message).await?;

        match self
            .deps
            .broadcaster
            .broadcast(MessageBroadcast::new(stored.clone()))
            .await
        {
            Ok(delivered) => {
                tracing::debug!(
                    room_id = %stored.room_id,
                    message_id = %stored.id,
                    delivered,
                    "消息已广播"
                );
                Ok(stored)
            }
            Err(broadcast_error) => {
                tracing::error!(
                    room_id = %stored.room_id,
                    message_id = %stored.id,
                    error = %broadcast_error,
                    "消息已保存，但广播失败"
                );
                Err(broadcast_error.into())
            }
        }
    }

    pub async fn list_messages(&self, room_id: &RoomId) -> Result<Vec<Message>, ApplicationError> {
        self.require_room(room_id).await?;
        Ok(self.deps.message_repository.select_by_room(room_id).await?)
    }

    /// 确认房间存在后发布推送流，返回时该流已能收到之后的广播
    pub async fn open_stream(
        &self,
        room_id: &RoomId,
        key: StreamKey,
        sink: Arc<dyn MessageSink>,
    ) -> Result<Subscription, ApplicationError> {
        let room = self.require_room(room_id).await?;
        Ok(self.deps.streams.publish(room.id, key, sink))
    }

    /// 在房间内打开推送流，直到连接取消、LeaveRoom 或被同一口令顶替
    pub async fn join_room(
        &self,
        room_id: &RoomId,
        key: StreamKey,
        sink: Arc<dyn MessageSink>,
        ctx: CancellationToken,
    ) -> Result<JoinOutcome, ApplicationError> {
        let subscription = self.open_stream(room_id, key, sink).await?;
        Ok(subscription.wait(ctx).await)
    }

    /// 不存在的推送流直接忽略
    pub fn leave_room(&self, room_id: &RoomId, key: &StreamKey) -> bool {
        let left = self.deps.streams.leave(room_id, key);
        if !left {
            tracing::debug!(room_id = %room_id, key = ?key, "离开时未找到推送流");
        }
        left
    }
}
