use std::sync::Arc;

use axum::{
    extract::{FromRequest, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use application::{ApplicationError, MessageDto, RoomDto, SendMessageRequest};
use domain::{RoomId, StreamKey};
use infrastructure::ChannelSink;

use crate::{error::ApiError, state::AppState};

/// 请求体解析失败时返回统一的错误格式
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
struct ApiJson<T>(T);

#[derive(Debug, Deserialize)]
struct HealthzPayload {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Serialize)]
struct HealthzResponse {
    msg: String,
}

#[derive(Debug, Deserialize)]
struct CreateRoomPayload {
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateRoomResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GetRoomPayload {
    id: String,
}

#[derive(Debug, Serialize)]
struct GetRoomResponse {
    room: RoomDto,
}

#[derive(Debug, Serialize)]
struct ListRoomResponse {
    rooms: Vec<RoomDto>,
}

#[derive(Debug, Serialize)]
struct GetPassResponse {
    pass: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamPayload {
    room_id: String,
    pass: String,
}

#[derive(Debug, Serialize)]
struct EmptyResponse {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessagePayload {
    room_id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ChatPayload {
    message: ChatMessagePayload,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: MessageDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagePayload {
    room_id: String,
}

#[derive(Debug, Serialize)]
struct ListMessageResponse {
    messages: Vec<MessageDto>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api.Healthz/Check", post(healthz_check))
        .nest("/api.ChatService", chat_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/CreateRoom", post(create_room))
        .route("/GetRoom", post(get_room))
        .route("/ListRoom", post(list_room))
        .route("/GetPass", post(get_pass))
        .route("/JoinRoom", post(join_room))
        .route("/LeaveRoom", post(leave_room))
        .route("/Chat", post(chat))
        .route("/ListMessage", post(list_message))
}

fn parse_pass(pass: String) -> Result<StreamKey, ApiError> {
    StreamKey::parse(pass).map_err(|err| ApplicationError::from(err).into())
}

async fn healthz_check(ApiJson(payload): ApiJson<HealthzPayload>) -> Json<HealthzResponse> {
    Json(HealthzResponse {
        msg: format!("Hello {}", payload.name),
    })
}

async fn create_room(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateRoomPayload>,
) -> Result<Json<CreateRoomResponse>, ApiError> {
    let room = state.chat_service.create_room(payload.name).await?;
    Ok(Json(CreateRoomResponse {
        id: room.id.as_str().to_owned(),
    }))
}

async fn get_room(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<GetRoomPayload>,
) -> Result<Json<GetRoomResponse>, ApiError> {
    let room = state.chat_service.get_room(&RoomId::new(payload.id)).await?;
    Ok(Json(GetRoomResponse {
        room: RoomDto::from(&room),
    }))
}

async fn list_room(State(state): State<AppState>) -> Result<Json<ListRoomResponse>, ApiError> {
    let rooms = state.chat_service.list_rooms().await?;
    Ok(Json(ListRoomResponse {
        rooms: rooms.iter().map(RoomDto::from).collect(),
    }))
}

async fn get_pass(State(state): State<AppState>) -> Result<Json<GetPassResponse>, ApiError> {
    let pass = state.chat_service.get_pass()?;
    Ok(Json(GetPassResponse {
        pass: pass.as_str().to_owned(),
    }))
}

/// 以 SSE 推送房间内的新消息。
///
/// 推送流在响应返回前已经注册，之后的 Chat 一定能送达。响应体被丢弃（客户端断开）
/// 或服务关闭时取消 join，LeaveRoom 或被顶替时推送通道关闭，响应随之结束。
async fn join_room(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<StreamPayload>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let room_id = RoomId::new(payload.room_id);
    let key = parse_pass(payload.pass)?;

    let (sink, receiver) = ChannelSink::channel(state.stream.sink_capacity);
    // 房间不存在时以普通响应返回错误，而不是空的事件流
    let subscription = state
        .chat_service
        .open_stream(&room_id, key, Arc::new(sink))
        .await?;

    let ctx = state.shutdown.child_token();
    let join_ctx = ctx.clone();
    tokio::spawn(async move {
        let outcome = subscription.wait(join_ctx).await;
        tracing::debug!(room_id = %room_id, ?outcome, "JoinRoom 结束");
    });

    let guard = ctx.drop_guard();
    let events = ReceiverStream::new(receiver).map(move |message| {
        let _connection = &guard;
        Event::default().event("message").json_data(MessageResponse {
            message: MessageDto::from(&message),
        })
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(state.stream.keep_alive)))
}

async fn leave_room(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<StreamPayload>,
) -> Result<Json<EmptyResponse>, ApiError> {
    let key = parse_pass(payload.pass)?;
    state
        .chat_service
        .leave_room(&RoomId::new(payload.room_id), &key);
    Ok(Json(EmptyResponse {}))
}

async fn chat(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ChatPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = state
        .chat_service
        .send_message(SendMessageRequest {
            room_id: RoomId::new(payload.message.room_id),
            text: payload.message.text,
        })
        .await?;
    Ok(Json(MessageResponse {
        message: MessageDto::from(&message),
    }))
}

async fn list_message(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ListMessagePayload>,
) -> Result<Json<ListMessageResponse>, ApiError> {
    let messages = state
        .chat_service
        .list_messages(&RoomId::new(payload.room_id))
        .await?;
    Ok(Json(ListMessageResponse {
        messages: messages.iter().map(MessageDto::from).collect(),
    }))
}
