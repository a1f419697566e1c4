//! Gmail API HTTP client
//!
//! Provides the read calls the ingestion job needs from the Gmail API.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use serde::de::DeserializeOwned;

use super::api::{GmailMessage, ListMessagesResponse, MessageRef, ProfileResponse};
use super::{AuthError, GmailAuth};
use crate::config::{GmailCredentials, GmailEndpoints};
use crate::error::{IngestError, ProviderError};
use crate::models::{MailCredential, MessageId};
use crate::provider::{MailProvider, ProviderConnector};

/// Search query selecting unread mail
const UNREAD_QUERY: &str = "is:unread";

/// Gmail label of the primary inbox
const INBOX_LABEL: &str = "INBOX";

/// Gmail API client for one connected mailbox
pub struct GmailClient {
    agent: ureq::Agent,
    auth: GmailAuth,
    base_url: String,
}

impl GmailClient {
    /// Create a new Gmail client
    pub fn new(agent: ureq::Agent, auth: GmailAuth, base_url: impl Into<String>) -> Self {
        Self {
            agent,
            auth,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// GET a Gmail API path and decode the JSON body.
    ///
    /// A 401 drops the cached access token and retries once with a fresh one.
    fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path_and_query);

        match self.get_json_once(&url) {
            Err(ProviderError::Unauthorized) => {
                log::debug!("Access token rejected, refreshing and retrying {}", path_and_query);
                self.auth.invalidate();
                self.get_json_once(&url)
            }
            other => other,
        }
    }

    fn get_json_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        let access_token = self.auth.get_access_token().map_err(|e| match e {
            AuthError::Rejected { .. } => ProviderError::Unauthorized,
            AuthError::Provider(p) => p,
        })?;

        let mut response = self
            .agent
            .get(url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()?;

        response
            .body_mut()
            .read_json()
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

impl MailProvider for GmailClient {
    fn profile_email(&self) -> Result<String, ProviderError> {
        let profile: ProfileResponse = self.get_json("/users/me/profile")?;
        Ok(profile.email_address)
    }

    fn list_unread_inbox(&self, max_results: usize) -> Result<Vec<MessageRef>, ProviderError> {
        let path = format!(
            "/users/me/messages?maxResults={}&labelIds={}&q={}",
            max_results.clamp(1, 500),
            INBOX_LABEL,
            urlencoding::encode(UNREAD_QUERY),
        );

        let list: ListMessagesResponse = self.get_json(&path)?;
        let messages = list.messages.unwrap_or_default();
        log::debug!(
            "Listed {} unread inbox messages (estimate {})",
            messages.len(),
            list.result_size_estimate.unwrap_or(0)
        );
        Ok(messages)
    }

    fn get_message(&self, id: &MessageId) -> Result<GmailMessage, ProviderError> {
        let path = format!(
            "/users/me/messages/{}?format=metadata&metadataHeaders=From&metadataHeaders=Subject",
            urlencoding::encode(id.as_str()),
        );
        self.get_json(&path)
    }
}

/// Builds Gmail clients from stored tenant credentials
pub struct GmailConnector {
    agent: ureq::Agent,
    credentials: GmailCredentials,
    endpoints: GmailEndpoints,
}

impl GmailConnector {
    pub fn new(credentials: GmailCredentials, endpoints: GmailEndpoints) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(endpoints.timeout()))
            .build()
            .into();

        Self {
            agent,
            credentials,
            endpoints,
        }
    }
}

impl ProviderConnector for GmailConnector {
    fn connect(&self, credential: &MailCredential) -> Result<Box<dyn MailProvider>, IngestError> {
        let refresh_token = credential
            .usable_refresh_token()
            .ok_or_else(|| IngestError::CredentialInvalid("no refresh token stored".to_string()))?;

        let mut auth = GmailAuth::new(
            self.agent.clone(),
            &self.endpoints.token_url,
            &self.credentials,
            refresh_token,
        );
        if let (Some(token), Some(expires_at)) = (&credential.access_token, credential.expires_at) {
            auth = auth.with_cached_token(token, expires_at);
        }

        // Exchange up front so a revoked grant surfaces as a credential problem
        auth.get_access_token().map_err(|e| match e {
            AuthError::Rejected { .. } => IngestError::CredentialInvalid(e.to_string()),
            AuthError::Provider(p) => IngestError::Provider(p),
        })?;

        Ok(Box::new(GmailClient::new(
            self.agent.clone(),
            auth,
            &self.endpoints.api_base,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_without_refresh_token() {
        let connector = GmailConnector::new(
            GmailCredentials {
                client_id: "id".into(),
                client_secret: "secret".into(),
            },
            GmailEndpoints::rooted_at("http://127.0.0.1:9"),
        );

        let mut credential = MailCredential::new("");
        credential.refresh_token = None;

        match connector.connect(&credential) {
            Err(IngestError::CredentialInvalid(reason)) => {
                assert!(reason.contains("refresh token"));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("connect should fail without a refresh token"),
        }
    }
}
