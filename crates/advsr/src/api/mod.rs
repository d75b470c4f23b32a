//! HTTP API module.
//!
//! REST endpoints for accounts and conversations, plus the WebSocket
//! subscription route.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
