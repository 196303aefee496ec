//! 聊天室系统核心领域模型
//!
//! 包含聊天室、消息以及推送流口令等值对象，不含任何行为之外的基础设施依赖。

pub mod chat_room;
pub mod errors;
pub mod message;
pub mod value_objects;

// 重新导出常用类型
pub use chat_room::ChatRoom;
pub use errors::*;
pub use message::Message;
pub use value_objects::*;
