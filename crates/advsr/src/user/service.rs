//! User service for business logic.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use super::UserError;
use super::models::User;
use super::repository::UserRepository;

/// Service for account registration and credential checks.
#[derive(Debug, Clone)]
pub struct UserService {
    repo: UserRepository,
}

impl UserService {
    /// Create a new user service.
    pub fn new(repo: UserRepository) -> Self {
        Self { repo }
    }

    /// Register a new account.
    ///
    /// Email is trimmed and lowercased before validation so lookups are
    /// case-insensitive. The duplicate check races with concurrent
    /// registrations; the UNIQUE constraint on `users.email` backstops it.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<User, UserError> {
        let email = email.trim().to_lowercase();

        if !is_valid_email(&email) {
            return Err(UserError::InvalidEmail);
        }

        if password.is_empty() {
            return Err(UserError::InvalidPassword);
        }

        if self.repo.get_by_email(&email).await?.is_some() {
            return Err(UserError::EmailTaken);
        }

        let hash = hash_password(password)?;
        let user = self.repo.create(&email, &hash, display_name).await?;
        info!(user_id = %user.id, "Registered new user");

        Ok(user)
    }

    /// Verify credentials against the stored bcrypt hash.
    ///
    /// Returns `None` for an unknown email and for a wrong password alike;
    /// callers cannot distinguish the two.
    #[instrument(skip(self, password))]
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, UserError> {
        let email = email.trim().to_lowercase();

        let user = self.repo.get_by_email(&email).await?;
        match user {
            Some(user) if verify_password(password, &user.password_hash)? => Ok(Some(user)),
            _ => Ok(None),
        }
    }
}

/// Basic email validation.
fn is_valid_email(email: &str) -> bool {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }
    !parts[0].is_empty() && parts[1].contains('.')
}

/// Hash a password using bcrypt.
fn hash_password(password: &str) -> Result<String> {
    // Use a lower cost factor for development speed
    let cost = if cfg!(debug_assertions) { 4 } else { 10 };
    bcrypt::hash(password, cost).context("Failed to hash password")
}

/// Verify a password against a bcrypt hash.
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).context("Failed to verify password")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn service() -> UserService {
        let db = Database::in_memory().await.unwrap();
        UserService::new(UserRepository::new(db.pool().clone()))
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user.name@sub.domain.com"));
        assert!(!is_valid_email("userexample.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@nodot"));
    }

    #[test]
    fn test_password_hashing() {
        let password = "test_password";
        let hash = hash_password(password).unwrap();
        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_register_and_verify() {
        let svc = service().await;

        let user = svc
            .register("Carol@Example.com", "s3cret", Some("Carol"))
            .await
            .unwrap();
        // Email normalized on the way in
        assert_eq!(user.email, "carol@example.com");

        let verified = svc
            .verify_credentials("carol@example.com", "s3cret")
            .await
            .unwrap();
        assert_eq!(verified.unwrap().id, user.id);

        let wrong = svc
            .verify_credentials("carol@example.com", "nope")
            .await
            .unwrap();
        assert!(wrong.is_none());

        let unknown = svc
            .verify_credentials("nobody@example.com", "s3cret")
            .await
            .unwrap();
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let svc = service().await;

        assert!(matches!(
            svc.register("not-an-email", "pw", None).await,
            Err(UserError::InvalidEmail)
        ));
        assert!(matches!(
            svc.register("dave@example.com", "", None).await,
            Err(UserError::InvalidPassword)
        ));

        svc.register("dave@example.com", "pw", None).await.unwrap();
        assert!(matches!(
            svc.register("dave@example.com", "pw", None).await,
            Err(UserError::EmailTaken)
        ));
        // Normalization applies to the duplicate check too
        assert!(matches!(
            svc.register(" DAVE@example.com ", "pw", None).await,
            Err(UserError::EmailTaken)
        ));
    }
}
