//! Web API 层。
//!
//! 以 `POST /api.ChatService/<Method>` 的形式暴露聊天服务，JoinRoom 使用 SSE 推送消息。

mod error;
mod routes;
mod state;

pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::{AppState, StreamSettings};
