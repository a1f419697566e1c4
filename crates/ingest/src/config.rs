//! Configuration for the ingestion job
//!
//! OAuth client credentials are loaded from (in order of priority):
//! 1. Compile-time embedded credentials (for production builds)
//! 2. JSON file (Google Cloud Console format) in the Savrii config directory
//! 3. Runtime environment variables (fallback)
//!
//! Job tuning lives in [`SyncOptions`], provider endpoints in [`GmailEndpoints`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::sync::RetryPolicy;

/// Credentials filename in the Savrii config directory
const CREDENTIALS_FILE: &str = "google-credentials.json";

/// OAuth client credentials for Gmail API access
#[derive(Debug, Clone)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google Cloud Console credential file format
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<ClientSection>,
    web: Option<ClientSection>,
}

#[derive(Deserialize)]
struct ClientSection {
    client_id: String,
    client_secret: String,
}

impl GmailCredentials {
    /// Load credentials: compile-time, then config file, then environment
    pub fn load() -> Result<Self> {
        if let Some(creds) = Self::from_compile_time() {
            return Ok(creds);
        }

        if config::config_exists(CREDENTIALS_FILE) {
            let creds: GoogleCredentialFile = config::load_json(CREDENTIALS_FILE)?;
            return Self::from_credential_file(creds);
        }

        Self::from_env()
    }

    /// Credentials embedded at build time via GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET
    pub fn from_compile_time() -> Option<Self> {
        let client_id = option_env!("GOOGLE_CLIENT_ID")?;
        let client_secret = option_env!("GOOGLE_CLIENT_SECRET")?;

        if client_id.is_empty() || client_secret.is_empty() {
            return None;
        }

        Some(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    /// Parse credentials from JSON string (Google Cloud Console format)
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::from_credential_file(creds)
    }

    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        // A server-side integration usually ships a "web" client
        let section = creds
            .web
            .or(creds.installed)
            .context("Credentials file missing 'web' or 'installed' section")?;

        Ok(Self {
            client_id: section.client_id,
            client_secret: section.client_secret,
        })
    }

    /// Load credentials from GMAIL_CLIENT_ID / GMAIL_CLIENT_SECRET
    pub fn from_env() -> Result<Self> {
        let client_id = config::env_string("GMAIL_CLIENT_ID")
            .context("GMAIL_CLIENT_ID environment variable not set")?;
        let client_secret = config::env_string("GMAIL_CLIENT_SECRET")
            .context("GMAIL_CLIENT_SECRET environment variable not set")?;

        Ok(Self {
            client_id,
            client_secret,
        })
    }
}

/// Gmail endpoints; overridable so tests can point at a local server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GmailEndpoints {
    pub api_base: String,
    pub token_url: String,
    /// Global timeout for a single HTTP call, in seconds
    pub timeout_secs: u64,
}

impl Default for GmailEndpoints {
    fn default() -> Self {
        Self {
            api_base: "https://gmail.googleapis.com/gmail/v1".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            timeout_secs: 30,
        }
    }
}

impl GmailEndpoints {
    /// Endpoints rooted at a single base URL (`{base}/gmail/v1`, `{base}/token`)
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: format!("{}/gmail/v1", base),
            token_url: format!("{}/token", base),
            ..Self::default()
        }
    }

    /// Check that both endpoints are absolute http(s) URLs
    pub fn validate(&self) -> Result<()> {
        for (name, raw) in [("apiBase", &self.api_base), ("tokenUrl", &self.token_url)] {
            let parsed =
                url::Url::parse(raw).with_context(|| format!("Invalid Gmail {}: {}", name, raw))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("Gmail {} must be http(s): {}", name, raw);
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// How a sync pass maintains a conversation's unread count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnreadCountMode {
    /// Recount `is_read == false` messages of the conversation at commit time
    #[default]
    Recount,
    /// Add the unread messages seen in this pass to the stored count.
    /// Re-syncing the same unread mail inflates the count.
    Accumulate,
}

/// What a per-message fetch or parse failure does to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureMode {
    /// Record the failure in the report and keep going
    #[default]
    Isolate,
    /// Abort the whole run; nothing is committed
    FailFast,
}

/// Tuning for one sync invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncOptions {
    /// Maximum number of unread inbox messages listed per run
    pub fetch_limit: usize,
    pub unread_count: UnreadCountMode,
    pub on_message_error: FailureMode,
    pub retry: RetryPolicy,
}

impl SyncOptions {
    /// Gmail caps `maxResults` at 500
    pub const MAX_FETCH_LIMIT: usize = 500;

    pub fn effective_fetch_limit(&self) -> usize {
        self.fetch_limit.clamp(1, Self::MAX_FETCH_LIMIT)
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch_limit: 20,
            unread_count: UnreadCountMode::default(),
            on_message_error: FailureMode::default(),
            retry: RetryPolicy::default(),
        }
    }
}
