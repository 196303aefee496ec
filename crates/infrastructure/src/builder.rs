use std::sync::Arc;
use std::time::Duration;

use application::{
    ChatService, ChatServiceDependencies, Clock, IdGenerator, StreamHub, StreamHubConfig,
    SystemClock, UuidV7Generator,
};

use crate::repository::{InMemoryChatRoomRepository, InMemoryMessageRepository};

#[derive(Debug, Clone)]
pub struct InfrastructureConfig {
    pub push_timeout: Duration,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            push_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct Infrastructure {
    pub rooms: Arc<InMemoryChatRoomRepository>,
    pub messages: Arc<InMemoryMessageRepository>,
    pub id_generator: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
    pub streams: Arc<StreamHub>,
}

impl Infrastructure {
    pub fn build(config: InfrastructureConfig) -> Self {
        let streams = Arc::new(StreamHub::new(StreamHubConfig {
            push_timeout: config.push_timeout,
        }));

        tracing::info!(
            push_timeout_ms = config.push_timeout.as_millis() as u64,
            "基础设施初始化完成"
        );

        Self {
            rooms: Arc::new(InMemoryChatRoomRepository::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            id_generator: Arc::new(UuidV7Generator),
            clock: Arc::new(SystemClock),
            streams,
        }
    }

    /// 组装聊天服务，推送流集合同时充当广播器
    pub fn chat_service(&self) -> ChatService {
        ChatService::new(ChatServiceDependencies {
            room_repository: self.rooms.clone(),
            message_repository: self.messages.clone(),
            id_generator: self.id_generator.clone(),
            clock: self.clock.clone(),
            broadcaster: self.streams.clone(),
            streams: self.streams.clone(),
        })
    }
}
