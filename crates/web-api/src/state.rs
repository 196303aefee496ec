use std::sync::Arc;
use std::time::Duration;

use application::ChatService;
use tokio_util::sync::CancellationToken;

/// JoinRoom 推送通道的参数
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub sink_capacity: usize,
    pub keep_alive: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            sink_capacity: 64,
            keep_alive: Duration::from_secs(15),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub stream: StreamSettings,
    /// 服务关闭时取消，每个 JoinRoom 连接持有它的子令牌
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(chat_service: Arc<ChatService>, stream: StreamSettings) -> Self {
        Self {
            chat_service,
            stream,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
