use async_trait::async_trait;
use domain::{ChatRoom, Message, RepositoryError, RoomId};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatRoomRepository: Send + Sync {
    async fn insert(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError>;
    async fn select(&self, id: &RoomId) -> Result<Option<ChatRoom>, RepositoryError>;
    // 不保证顺序，由调用方排序
    async fn select_all(&self) -> Result<Vec<ChatRoom>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError>;

    // 按发送顺序返回
    async fn select_by_room(&self, room_id: &RoomId) -> Result<Vec<Message>, RepositoryError>;
}
