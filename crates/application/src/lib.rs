//! 应用层实现。
//!
//! 这里提供围绕聊天室与消息的用例服务，以及推送流注册表和房间内广播。
//! 存储、标识符生成、时间与推送通道都通过 trait 抽象，由基础设施层注入。

pub mod broadcaster;
pub mod clock;
pub mod dto;
pub mod error;
pub mod id_generator;
pub mod repository;
pub mod services;
pub mod stream;
pub mod stream_hub;
pub mod stream_registry;

pub use broadcaster::{BroadcastError, MessageBroadcast, MessageBroadcaster};
pub use clock::{Clock, FixedClock, SystemClock};
pub use dto::{MessageDto, RoomDto};
pub use error::ApplicationError;
pub use id_generator::{IdGenerationError, IdGenerator, UuidV7Generator};
pub use repository::{ChatRoomRepository, MessageRepository};
pub use services::{ChatService, ChatServiceDependencies, SendMessageRequest};
pub use stream::{ChatStream, CloseReason, MessageSink, SinkError, StreamState};
pub use stream_hub::{JoinOutcome, StreamHub, StreamHubConfig, Subscription};
pub use stream_registry::StreamRegistry;
