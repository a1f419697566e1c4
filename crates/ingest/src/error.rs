//! Error types surfaced by the ingestion job

use crate::gmail::NormalizeError;
use crate::models::{MessageId, TenantId};

/// Failure talking to the mail provider
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limited by mail provider")]
    RateLimited,

    #[error("mail provider rejected the access token")]
    Unauthorized,

    #[error("mail provider returned HTTP {status}")]
    Http { status: u16 },

    #[error("mail provider request failed: {0}")]
    Transport(String),

    #[error("failed to decode mail provider response: {0}")]
    Decode(String),

    #[error("malformed message {id}: {source}")]
    Malformed {
        id: String,
        #[source]
        source: NormalizeError,
    },
}

impl ProviderError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited | ProviderError::Transport(_) => true,
            ProviderError::Http { status } => *status >= 500,
            _ => false,
        }
    }

    pub fn malformed(id: &MessageId, source: NormalizeError) -> Self {
        ProviderError::Malformed {
            id: id.as_str().to_string(),
            source,
        }
    }
}

impl From<ureq::Error> for ProviderError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(429) => ProviderError::RateLimited,
            ureq::Error::StatusCode(401) => ProviderError::Unauthorized,
            ureq::Error::StatusCode(status) => ProviderError::Http { status },
            other => ProviderError::Transport(other.to_string()),
        }
    }
}

/// Terminal error of a sync invocation
///
/// Every variant means nothing was committed for the run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("no tenant id supplied")]
    Unauthorized,

    #[error("no mail account connected for tenant {0}")]
    NotConnected(TenantId),

    #[error("stored mail credential is invalid: {0}")]
    CredentialInvalid(String),

    #[error("a sync is already running for tenant {0}")]
    Busy(TenantId),

    #[error("mail provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("database error: {0:#}")]
    Store(#[source] anyhow::Error),
}

impl IngestError {
    /// HTTP status the host should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            IngestError::Unauthorized => 401,
            IngestError::NotConnected(_) | IngestError::CredentialInvalid(_) => 400,
            IngestError::Busy(_) => 409,
            IngestError::Provider(_) => 502,
            IngestError::Store(_) => 500,
        }
    }

    /// Underlying provider/database detail for the error payload
    pub fn detail(&self) -> Option<String> {
        match self {
            IngestError::Provider(err) => Some(err.to_string()),
            IngestError::Store(err) => Some(format!("{:#}", err)),
            IngestError::CredentialInvalid(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Whether the provider call behind this error may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, IngestError::Provider(err) if err.is_transient())
    }

    /// Whether the tenant has to reconnect their mailbox
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self,
            IngestError::NotConnected(_) | IngestError::CredentialInvalid(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::RateLimited.is_transient());
        assert!(ProviderError::Transport("reset".into()).is_transient());
        assert!(ProviderError::Http { status: 503 }.is_transient());
        assert!(!ProviderError::Http { status: 404 }.is_transient());
        assert!(!ProviderError::Unauthorized.is_transient());
        assert!(!ProviderError::Decode("eof".into()).is_transient());
    }

    #[test]
    fn test_ureq_status_mapping() {
        assert!(matches!(
            ProviderError::from(ureq::Error::StatusCode(429)),
            ProviderError::RateLimited
        ));
        assert!(matches!(
            ProviderError::from(ureq::Error::StatusCode(401)),
            ProviderError::Unauthorized
        ));
        assert!(matches!(
            ProviderError::from(ureq::Error::StatusCode(500)),
            ProviderError::Http { status: 500 }
        ));
    }

    #[test]
    fn test_status_codes() {
        let tenant = TenantId::new("t");
        assert_eq!(IngestError::Unauthorized.status_code(), 401);
        assert_eq!(IngestError::NotConnected(tenant.clone()).status_code(), 400);
        assert_eq!(IngestError::Busy(tenant).status_code(), 409);
        assert_eq!(
            IngestError::Provider(ProviderError::RateLimited).status_code(),
            502
        );
        assert_eq!(
            IngestError::Store(anyhow::anyhow!("disk full")).status_code(),
            500
        );
    }

    #[test]
    fn test_only_transient_provider_errors_are_retryable() {
        assert!(IngestError::Provider(ProviderError::Http { status: 503 }).is_transient());
        assert!(IngestError::Provider(ProviderError::RateLimited).is_transient());
        assert!(!IngestError::Provider(ProviderError::Http { status: 404 }).is_transient());
        assert!(!IngestError::CredentialInvalid("invalid_grant".into()).is_transient());
        assert!(!IngestError::Store(anyhow::anyhow!("locked")).is_transient());
    }

    #[test]
    fn test_detail_only_for_underlying_failures() {
        assert!(IngestError::Unauthorized.detail().is_none());
        let err = IngestError::Provider(ProviderError::Http { status: 503 });
        assert_eq!(err.detail().unwrap(), "mail provider returned HTTP 503");
    }
}
