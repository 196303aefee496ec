//! 推送流注册表
//!
//! 两级映射 `RoomId -> StreamKey -> ChatStream`，由一把互斥锁保护外层和内层结构。
//! 所有操作在锁内只做 O(1) 的映射操作或一次快照拷贝，推送消息永远发生在锁外。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use domain::{RoomId, StreamKey};

use crate::stream::ChatStream;

type RoomStreams = HashMap<StreamKey, Arc<ChatStream>>;

#[derive(Default)]
pub struct StreamRegistry {
    rooms: Mutex<HashMap<RoomId, RoomStreams>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // 锁内不会执行任何可能 panic 的用户代码，中毒后直接沿用内部数据
    fn lock(&self) -> MutexGuard<'_, HashMap<RoomId, RoomStreams>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 以流自身的 `(room_id, key)` 插入或覆盖，返回被顶替的旧流。
    ///
    /// 房间的子映射在第一次插入时创建。
    pub fn add(&self, stream: Arc<ChatStream>) -> Option<Arc<ChatStream>> {
        let mut rooms = self.lock();
        rooms
            .entry(stream.room_id().clone())
            .or_default()
            .insert(stream.key().clone(), stream)
    }

    /// 删除 `(room_id, key)` 上的流，不存在时什么也不做
    pub fn remove(&self, room_id: &RoomId, key: &StreamKey) -> Option<Arc<ChatStream>> {
        let mut rooms = self.lock();
        rooms.get_mut(room_id).and_then(|streams| streams.remove(key))
    }

    /// 只有当注册表中仍是同一个流实例时才删除。
    ///
    /// 被顶替的旧流在清理时不会误删取代它的新流。
    pub fn remove_stream(&self, stream: &Arc<ChatStream>) -> bool {
        let mut rooms = self.lock();
        let Some(streams) = rooms.get_mut(stream.room_id()) else {
            return false;
        };
        match streams.get(stream.key()) {
            Some(current) if Arc::ptr_eq(current, stream) => {
                streams.remove(stream.key());
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, room_id: &RoomId, key: &StreamKey) -> Option<Arc<ChatStream>> {
        let rooms = self.lock();
        rooms.get(room_id).and_then(|streams| streams.get(key)).cloned()
    }

    /// 房间内当前所有流的时点拷贝。
    ///
    /// 返回后注册表的任何变化都不会影响这份拷贝，调用方可以在不持锁的情况下遍历。
    pub fn snapshot(&self, room_id: &RoomId) -> Vec<Arc<ChatStream>> {
        let rooms = self.lock();
        rooms
            .get(room_id)
            .map(|streams| streams.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 房间内活跃流的数量
    pub fn room_len(&self, room_id: &RoomId) -> usize {
        self.lock().get(room_id).map_or(0, HashMap::len)
    }

    /// 所有房间的活跃流总数
    pub fn len(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
