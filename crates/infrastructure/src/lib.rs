//! 基础设施层实现。
//!
//! 提供进程内仓储与基于通道的推送句柄，实现应用层定义的接口，并负责组装聊天服务。

pub mod builder;
pub mod repository;
pub mod sink;

pub use builder::{Infrastructure, InfrastructureConfig};
pub use repository::{InMemoryChatRoomRepository, InMemoryMessageRepository};
pub use sink::ChannelSink;
