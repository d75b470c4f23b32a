//! API request handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use advsr_protocol::{ConversationSnapshot, ConversationView, MessageView};

use crate::auth::CurrentUser;
use crate::chat::{Conversation, Message};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Registration request.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response carrying a freshly issued token.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user_id: String,
    pub token: String,
}

/// Register a new user.
///
/// POST /v1/register
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .users
        .register(
            &request.email,
            &request.password,
            request.display_name.as_deref(),
        )
        .await?;

    let token = state
        .auth
        .generate_token(&user.id, &user.email, user.display_name.as_deref())?;

    info!(user_id = %user.id, "User registered successfully");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id: user.id,
            token,
        }),
    ))
}

/// Login with email and password.
///
/// POST /v1/login
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .users
        .verify_credentials(&request.email, &request.password)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let token = state
        .auth
        .generate_token(&user.id, &user.email, user.display_name.as_deref())?;
    let cookie = auth_cookie(&state, &token);

    info!(user_id = %user.id, "User logged in successfully");

    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(AuthResponse {
            user_id: user.id,
            token,
        }),
    ))
}

/// Logout endpoint (clears auth cookie).
///
/// POST /v1/logout
pub async fn logout() -> impl IntoResponse {
    // Clear the auth cookie by setting it to empty with immediate expiry
    let cookie = "auth_token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0";

    (
        AppendHeaders([(SET_COOKIE, cookie.to_string())]),
        StatusCode::NO_CONTENT,
    )
}

/// Build the auth cookie for a freshly issued token.
fn auth_cookie(state: &AppState, token: &str) -> String {
    let secure_flag = if state.auth.is_dev_mode() {
        ""
    } else {
        " Secure;"
    };
    format!(
        "auth_token={}; Path=/; HttpOnly; SameSite=Lax;{} Max-Age={}",
        token,
        secure_flag,
        60 * 60 * 24 // matches the default token lifetime
    )
}

/// Request body carrying one user message.
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

/// Create a conversation from its first message and start streaming.
///
/// POST /v1/chats
pub async fn create_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<MessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let conversation = state
        .chat
        .create_conversation(user.id(), &request.message)
        .await?;

    Ok((StatusCode::CREATED, Json(conversation.view())))
}

/// List the caller's conversations, newest first.
///
/// GET /v1/chats
pub async fn list_chats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<ConversationView>>> {
    let conversations = state.chat.list_conversations(user.id()).await?;
    Ok(Json(conversations.iter().map(Conversation::view).collect()))
}

/// Get one conversation with its visible messages.
///
/// GET /v1/chats/{id}
pub async fn get_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ConversationSnapshot>> {
    Ok(Json(state.chat.snapshot(user.id(), &id).await?))
}

/// Submit a message to an existing conversation.
///
/// POST /v1/chats/{id}/message
pub async fn submit_chat_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> ApiResult<Json<ConversationView>> {
    let conversation = state
        .chat
        .submit_message(user.id(), &id, &request.message)
        .await?;

    Ok(Json(conversation.view()))
}

/// List a conversation's messages in insertion order.
///
/// GET /v1/chats/{id}/messages
pub async fn list_chat_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let messages = state.chat.list_messages(user.id(), &id).await?;
    Ok(Json(messages.iter().map(Message::view).collect()))
}

/// Delete a conversation and close its subscriptions.
///
/// DELETE /v1/chats/{id}
pub async fn delete_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.chat.delete_conversation(user.id(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
