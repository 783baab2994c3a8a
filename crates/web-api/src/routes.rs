use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::services::{
    AuthenticateUserRequest, CreateChatRequest, RegisterUserRequest,
};
use application::{ChatDto, ChatHistoryDto, UserDto};

use crate::{
    auth::LoginResponse, error::ApiError, state::AppState, ws_connection::ChatSocket,
};

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    name: String,
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct CreateChatPayload {
    participants: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register_user))
        .route("/users/login", post(login_user))
        .route("/chats", post(create_chat).get(list_chats))
        .route("/chats/{chat_id}/messages", get(chat_history))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<UserDto>), ApiError> {
    let dto = state
        .user_service
        .register(RegisterUserRequest {
            name: payload.name,
            email: payload.email,
            password: payload.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(dto)))
}

async fn login_user(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .user_service
        .authenticate(AuthenticateUserRequest {
            email: payload.email,
            password: payload.password,
        })
        .await?;

    let token = state.jwt_service.generate_token(user.id)?;
    Ok(Json(LoginResponse { user, token }))
}

/// 查找或创建会话。已存在时回 200，新建时回 201，两者都是成功。
async fn create_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateChatPayload>,
) -> Result<(StatusCode, Json<ChatDto>), ApiError> {
    let requester_id = state.jwt_service.extract_user_from_headers(&headers)?;

    let outcome = state
        .chat_service
        .create_or_get_chat(CreateChatRequest {
            requester_id,
            participants: payload.participants,
        })
        .await?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.chat)))
}

async fn list_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChatDto>>, ApiError> {
    let requester_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let chats = state.chat_service.list_chats_for(requester_id).await?;
    Ok(Json(chats))
}

async fn chat_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ChatHistoryDto>, ApiError> {
    let requester_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let history = state
        .chat_service
        .chat_history(
            chat_id,
            requester_id,
            query.page.unwrap_or(1),
            query.limit.unwrap_or(20),
        )
        .await?;
    Ok(Json(history))
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: String,
}

/// WebSocket 握手。凭证无效或用户已不存在时直接拒绝升级，
/// 连接永远不会进入已认证状态。
async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let claims = state.jwt_service.verify_token(&query.token)?;
    let identity = state
        .user_service
        .identity(claims.user_id)
        .await
        .map_err(|_| ApiError::unauthorized("User no longer exists"))?;

    tracing::info!(user_id = %identity.id, "websocket upgrade");

    Ok(ws.on_upgrade(move |socket| ChatSocket::new(state, identity).run(socket)))
}
