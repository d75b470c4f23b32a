//! Test utilities and common setup.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use advsr::api::{AppState, create_router};
use advsr::auth::{AuthConfig, AuthState};
use advsr::chat::testing::ScriptedProvider;
use advsr::chat::{ChatRepository, ChatService, ConversationLifecycle, DEFAULT_DELTA_BATCH_SIZE};
use advsr::db::Database;
use advsr::user::{UserRepository, UserService};
use advsr::ws::ChatHub;

/// Create a test AuthConfig with a JWT secret for testing.
fn test_auth_config() -> AuthConfig {
    AuthConfig {
        dev_mode: true,
        jwt_secret: Some("test-secret-for-integration-tests-minimum-32-chars".to_string()),
        ..Default::default()
    }
}

/// A fully wired application over an in-memory database and a scripted
/// completion provider, with handles to the pieces tests need to observe.
pub struct TestApp {
    pub router: Router,
    pub provider: Arc<ScriptedProvider>,
    pub hub: ChatHub,
    lifecycle: ConversationLifecycle,
}

impl TestApp {
    /// Wait for a conversation's completion turn to finish.
    pub async fn wait_until_idle(&self, conversation_id: &str) {
        for _ in 0..200 {
            if !self.lifecycle.is_running(conversation_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("conversation {conversation_id} never returned to idle");
    }
}

/// Create a test application whose provider streams the given deltas.
pub async fn test_app_with(provider: ScriptedProvider) -> TestApp {
    let db = Database::in_memory().await.unwrap();
    let auth_state = AuthState::new(test_auth_config());

    let provider = Arc::new(provider);
    let chat_repo = ChatRepository::new(db.pool().clone());
    let lifecycle = ConversationLifecycle::new(chat_repo.clone());
    let hub = ChatHub::new();
    let chat_service = ChatService::new(
        chat_repo,
        lifecycle.clone(),
        hub.clone(),
        provider.clone(),
        DEFAULT_DELTA_BATCH_SIZE,
    );

    let user_service = UserService::new(UserRepository::new(db.pool().clone()));

    let state = AppState::new(chat_service, user_service, auth_state, hub.clone());
    TestApp {
        router: create_router(state),
        provider,
        hub,
        lifecycle,
    }
}

/// Create a test application with a default scripted reply.
pub async fn test_app() -> TestApp {
    test_app_with(ScriptedProvider::new(["Search ", "engine ", "optimization."])).await
}

/// Register a user and return their bearer token.
pub async fn register_user(app: &Router, email: &str) -> String {
    let response = send_json(
        app,
        Method::POST,
        "/v1/register",
        None,
        serde_json::json!({ "email": email, "password": "s3cret" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    json["token"].as_str().unwrap().to_string()
}

/// Send a request with an optional bearer token and JSON body.
pub async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> Response<Body> {
    let mut builder = Request::builder()
        .uri(uri)
        .method(method)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.clone()
        .oneshot(
            builder
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Send a bodyless request with an optional bearer token.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().uri(uri).method(method);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
