//! User accounts module.
//!
//! Registration and credential verification against bcrypt password hashes.

mod models;
mod repository;
mod service;

pub use models::User;
pub use repository::UserRepository;
pub use service::UserService;

/// Expected failures of account operations.
///
/// Everything a caller can anticipate and handle is a variant here;
/// infrastructure failures travel through `Persistence`.
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("invalid email address")]
    InvalidEmail,

    #[error("password must not be empty")]
    InvalidPassword,

    #[error("email is already registered")]
    EmailTaken,

    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}
