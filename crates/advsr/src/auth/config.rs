//! Authentication configuration.

use serde::{Deserialize, Serialize};

/// Default token lifetime: 24 hours.
const DEFAULT_TOKEN_TTL_SECS: i64 = 60 * 60 * 24;

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable development mode (relaxed CORS, no Secure cookie flag).
    pub dev_mode: bool,

    /// JWT secret for HS256. Supports `env:VAR_NAME` indirection.
    /// REQUIRED when dev_mode is false.
    pub jwt_secret: Option<String>,

    /// Issuer written into generated tokens.
    pub issuer: String,

    /// Token lifetime in seconds.
    pub token_ttl_secs: i64,

    /// Allowed CORS origins. If empty in production, CORS is disabled.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            // No default JWT secret - must be explicitly configured
            jwt_secret: None,
            issuer: "advsr".to_string(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8080".to_string(),
            ],
        }
    }
}

impl AuthConfig {
    /// Resolve the JWT secret, expanding `env:VAR_NAME` syntax.
    /// Returns the resolved secret or None if not configured.
    pub fn resolve_jwt_secret(&self) -> Result<Option<String>, ConfigValidationError> {
        match &self.jwt_secret {
            None => Ok(None),
            Some(value) => {
                if let Some(var_name) = value.strip_prefix("env:") {
                    match std::env::var(var_name) {
                        Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
                        Ok(_) => Err(ConfigValidationError::EnvVarEmpty(var_name.to_string())),
                        Err(_) => Err(ConfigValidationError::EnvVarNotFound(var_name.to_string())),
                    }
                } else {
                    Ok(Some(value.clone()))
                }
            }
        }
    }

    /// Validate the configuration.
    /// Returns an error if the configuration is invalid for the current mode.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.dev_mode {
            let secret = self.resolve_jwt_secret()?;

            match secret {
                None => return Err(ConfigValidationError::MissingJwtSecret),
                // Enforce minimum secret length
                Some(secret) if secret.len() < 32 => {
                    return Err(ConfigValidationError::JwtSecretTooShort);
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// JWT secret is required in production mode.
    MissingJwtSecret,
    /// JWT secret is too short (minimum 32 characters).
    JwtSecretTooShort,
    /// Environment variable not found (for `env:VAR_NAME` syntax).
    EnvVarNotFound(String),
    /// Environment variable is empty (for `env:VAR_NAME` syntax).
    EnvVarEmpty(String),
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingJwtSecret => {
                write!(
                    f,
                    "JWT secret is required when dev_mode is false. Set jwt_secret in config or use env: indirection."
                )
            }
            Self::JwtSecretTooShort => {
                write!(
                    f,
                    "JWT secret must be at least 32 characters long for security."
                )
            }
            Self::EnvVarNotFound(name) => {
                write!(f, "Environment variable '{}' not found", name)
            }
            Self::EnvVarEmpty(name) => {
                write!(f, "Environment variable '{}' is empty", name)
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_secret_in_production() {
        let config = AuthConfig::default();
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::MissingJwtSecret)
        );
    }

    #[test]
    fn test_validate_rejects_short_secret() {
        let config = AuthConfig {
            jwt_secret: Some("short".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::JwtSecretTooShort)
        );
    }

    #[test]
    fn test_validate_accepts_dev_mode_without_secret() {
        let config = AuthConfig {
            dev_mode: true,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_plain_secret() {
        let config = AuthConfig {
            jwt_secret: Some("a-plain-secret-value-of-sufficient-len".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_jwt_secret().unwrap().as_deref(),
            Some("a-plain-secret-value-of-sufficient-len")
        );
    }

    #[test]
    fn test_resolve_env_secret_missing() {
        let config = AuthConfig {
            jwt_secret: Some("env:ADVSR_TEST_SECRET_THAT_DOES_NOT_EXIST".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve_jwt_secret(),
            Err(ConfigValidationError::EnvVarNotFound(_))
        ));
    }
}
