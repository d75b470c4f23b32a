//! Authentication module.
//!
//! JWT issuance and validation (HS256) plus the axum middleware that guards
//! protected routes. Tokens are accepted from the `Authorization` header,
//! the `auth_token` cookie, or the `token` query parameter (browser
//! WebSocket clients cannot set headers).

mod claims;
mod config;
mod error;
mod middleware;

pub use claims::Claims;
pub use config::{AuthConfig, ConfigValidationError};
pub use error::AuthError;
pub use middleware::{AuthState, CurrentUser, auth_middleware};
