//! Gmail OAuth2 token handling
//!
//! Tenants connect their mailbox through the dashboard, which stores a
//! refresh token. Sync only ever exchanges that refresh token for a
//! short-lived access token; there is no interactive consent flow here.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use serde::Deserialize;
use std::sync::{Mutex, PoisonError};

use crate::config::GmailCredentials;
use crate::error::ProviderError;

/// Failure obtaining an access token
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token endpoint refused the refresh token (revoked, expired, wrong client)
    #[error("refresh token rejected by token endpoint (HTTP {status})")]
    Rejected { status: u16 },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Access token cached for the lifetime of one client
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<i64>,
}

impl CachedToken {
    fn is_fresh(&self, now: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at > now + GmailAuth::EXPIRY_BUFFER_SECS)
    }
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// Exchanges a stored refresh token for access tokens
pub struct GmailAuth {
    agent: ureq::Agent,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    cached: Mutex<Option<CachedToken>>,
}

impl GmailAuth {
    /// Tokens closer than this to expiry are refreshed
    const EXPIRY_BUFFER_SECS: i64 = 300;

    /// Create a token source for one tenant's refresh token
    pub fn new(
        agent: ureq::Agent,
        token_url: impl Into<String>,
        credentials: &GmailCredentials,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            agent,
            token_url: token_url.into(),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            refresh_token: refresh_token.into(),
            cached: Mutex::new(None),
        }
    }

    /// Seed the cache with a previously issued access token
    pub fn with_cached_token(self, access_token: impl Into<String>, expires_at: i64) -> Self {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(CachedToken {
            access_token: access_token.into(),
            expires_at: Some(expires_at),
        });
        self
    }

    /// Get a valid access token, refreshing when the cached one is stale
    pub fn get_access_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        let now = chrono::Utc::now().timestamp();

        if let Some(token) = cached.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.access_token.clone());
        }

        let response = self.refresh_access_token()?;
        let token = CachedToken {
            access_token: response.access_token,
            expires_at: response.expires_in.map(|secs| now + secs as i64),
        };
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// Drop the cached token so the next call performs a fresh exchange
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Refresh an access token using the refresh token
    fn refresh_access_token(&self) -> Result<TokenResponse, AuthError> {
        log::debug!("Exchanging refresh token at {}", self.token_url);

        let result = self.agent.post(&self.token_url).send_form([
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ]);

        let mut response = match result {
            Ok(response) => response,
            // Google answers invalid_grant with 400, unknown clients with 401
            Err(ureq::Error::StatusCode(status @ (400 | 401))) => {
                return Err(AuthError::Rejected { status });
            }
            Err(e) => return Err(ProviderError::from(e).into()),
        };

        let token: TokenResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_freshness() {
        let now = 1_000_000;
        let fresh = CachedToken {
            access_token: "a".into(),
            expires_at: Some(now + 3600),
        };
        let stale = CachedToken {
            access_token: "b".into(),
            expires_at: Some(now + 60),
        };
        let unknown = CachedToken {
            access_token: "c".into(),
            expires_at: None,
        };
        assert!(fresh.is_fresh(now));
        assert!(!stale.is_fresh(now));
        assert!(!unknown.is_fresh(now));
    }

    #[test]
    fn test_seeded_token_skips_exchange() {
        let creds = GmailCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
        };
        // Unroutable token URL: any exchange attempt would fail
        let auth = GmailAuth::new(ureq::Agent::new_with_defaults(), "http://127.0.0.1:9/token", &creds, "rt")
            .with_cached_token("cached-token", chrono::Utc::now().timestamp() + 3600);

        assert_eq!(auth.get_access_token().unwrap(), "cached-token");
    }
}
