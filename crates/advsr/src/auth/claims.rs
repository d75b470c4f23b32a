//! JWT claims.

use serde::{Deserialize, Serialize};

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,

    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,

    /// Expiration time (as Unix timestamp).
    pub exp: i64,

    /// Issued at (as Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,

    /// User's email.
    #[serde(default)]
    pub email: Option<String>,

    /// User's display name.
    #[serde(default)]
    pub name: Option<String>,
}

impl Claims {
    /// Get the display name for the user.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(name: Option<&str>, email: Option<&str>) -> Claims {
        Claims {
            sub: "u1".to_string(),
            iss: None,
            exp: 0,
            iat: None,
            email: email.map(str::to_string),
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_display_name_fallbacks() {
        assert_eq!(
            claims(Some("Jo"), Some("jo@example.com")).display_name(),
            "Jo"
        );
        assert_eq!(
            claims(None, Some("jo@example.com")).display_name(),
            "jo@example.com"
        );
        assert_eq!(claims(None, None).display_name(), "u1");
    }
}
