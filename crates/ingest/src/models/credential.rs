//! Stored mail-provider credential of a tenant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth credential written by the dashboard's "connect Gmail" flow
///
/// Only the refresh token is required for sync; the cached access token is
/// an optimization that lets a sync skip the token exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailCredential {
    /// Email address of the connected mailbox, if known
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Unix timestamp (seconds) at which `access_token` expires
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl MailCredential {
    /// Create a credential from a refresh token
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            email: None,
            refresh_token: Some(refresh_token.into()),
            access_token: None,
            expires_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Set the connected mailbox address
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Attach a cached access token
    pub fn with_access_token(mut self, token: impl Into<String>, expires_at: i64) -> Self {
        self.access_token = Some(token.into());
        self.expires_at = Some(expires_at);
        self
    }

    /// The refresh token, if present and non-blank
    pub fn usable_refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_refresh_token() {
        assert_eq!(MailCredential::new("rt-1").usable_refresh_token(), Some("rt-1"));
        assert_eq!(MailCredential::new("  ").usable_refresh_token(), None);

        let mut cred = MailCredential::new("rt-1");
        cred.refresh_token = None;
        assert_eq!(cred.usable_refresh_token(), None);
    }

    #[test]
    fn test_deserialize_without_optional_fields() {
        let json = r#"{ "updatedAt": "2025-01-15T10:30:00Z" }"#;
        let cred: MailCredential = serde_json::from_str(json).unwrap();
        assert!(cred.refresh_token.is_none());
        assert!(cred.email.is_none());
    }
}
