//! API route definitions.

use axum::http::{HeaderValue, Method, header};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, warn};

use crate::auth::auth_middleware;
use crate::ws::ws_handler;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    // Tracing layer with request spans and timing
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let auth_state = state.auth.clone();

    // Protected routes (require authentication)
    let protected_routes = Router::new()
        .route(
            "/v1/chats",
            post(handlers::create_chat).get(handlers::list_chats),
        )
        .route(
            "/v1/chats/{id}",
            get(handlers::get_chat).delete(handlers::delete_chat),
        )
        .route(
            "/v1/chats/{id}/message",
            post(handlers::submit_chat_message),
        )
        .route(
            "/v1/chats/{id}/messages",
            get(handlers::list_chat_messages),
        )
        // WebSocket subscriptions go through the same middleware; browser
        // clients pass the token as a query parameter
        .route("/chat", get(ws_handler))
        .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
        .with_state(state.clone());

    // Public routes (no authentication)
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/register", post(handlers::register))
        .route("/v1/login", post(handlers::login))
        .route("/v1/logout", post(handlers::logout))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(trace_layer)
}

/// Build the CORS layer based on configuration.
///
/// Dev mode always admits the common localhost origins; outside dev mode
/// cross-origin requests are denied until origins are configured.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let dev_mode = state.auth.is_dev_mode();

    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];
    let headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::ORIGIN,
        header::COOKIE,
    ];

    let mut origins: Vec<HeaderValue> = state
        .auth
        .allowed_origins()
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                warn!("CORS: invalid origin in config: {}", origin);
                None
            })
        })
        .collect();

    if dev_mode {
        for origin in [
            "http://localhost:3000",
            "http://localhost:8080",
            "http://127.0.0.1:3000",
            "http://127.0.0.1:8080",
        ] {
            if let Ok(value) = origin.parse::<HeaderValue>() {
                if !origins.contains(&value) {
                    origins.push(value);
                }
            }
        }
    }

    if origins.is_empty() {
        warn!("CORS: no origins configured, denying all cross-origin requests");
        return CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static("null")));
    }

    info!("CORS: allowing {} origin(s)", origins.len());
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true)
}
