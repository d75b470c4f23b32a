//! User data models.

use sqlx::FromRow;

/// User entity from database.
///
/// Never serialized to clients directly; API responses carry only the id.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
