//! 进程内存储。
//!
//! 以互斥锁保护的映射表实现仓储接口，进程退出后数据丢失。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use application::{ChatRoomRepository, MessageRepository};
use async_trait::async_trait;
use domain::{ChatRoom, Message, RepositoryError, RoomId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct InMemoryChatRoomRepository {
    rooms: Mutex<HashMap<RoomId, ChatRoom>>,
}

impl InMemoryChatRoomRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatRoomRepository for InMemoryChatRoomRepository {
    async fn insert(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let mut rooms = lock(&self.rooms);
        if rooms.contains_key(&room.id) {
            return Err(RepositoryError::Conflict);
        }
        rooms.insert(room.id.clone(), room.clone());
        Ok(room)
    }

    async fn select(&self, id: &RoomId) -> Result<Option<ChatRoom>, RepositoryError> {
        Ok(lock(&self.rooms).get(id).cloned())
    }

    async fn select_all(&self) -> Result<Vec<ChatRoom>, RepositoryError> {
        Ok(lock(&self.rooms).values().cloned().collect())
    }
}

/// 按房间保存消息，房间内保持写入顺序
#[derive(Debug, Default)]
pub struct InMemoryMessageRepository {
    messages: Mutex<HashMap<RoomId, Vec<Message>>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut messages = lock(&self.messages);
        let room = messages.entry(message.room_id.clone()).or_default();
        if room.iter().any(|existing| existing.id == message.id) {
            return Err(RepositoryError::Conflict);
        }
        room.push(message.clone());
        Ok(message)
    }

    async fn select_by_room(&self, room_id: &RoomId) -> Result<Vec<Message>, RepositoryError> {
        Ok(lock(&self.messages)
            .get(room_id)
            .cloned()
            .unwrap_or_default())
    }
}
