//! Seams between the ingestion job and the mail provider
//!
//! The job only sees these traits, so tests can drive it with scripted
//! providers and the host can swap the Gmail implementation's endpoints.

use crate::error::{IngestError, ProviderError};
use crate::gmail::api::{GmailMessage, MessageRef};
use crate::models::{MailCredential, MessageId};

/// Read access to one connected mailbox
pub trait MailProvider {
    /// Email address of the connected mailbox
    fn profile_email(&self) -> Result<String, ProviderError>;

    /// Most recent unread messages in the primary inbox, newest first
    fn list_unread_inbox(&self, max_results: usize) -> Result<Vec<MessageRef>, ProviderError>;

    /// Headers and snippet of a single message
    fn get_message(&self, id: &MessageId) -> Result<GmailMessage, ProviderError>;
}

/// Opens a [`MailProvider`] from a tenant's stored credential
pub trait ProviderConnector: Send + Sync {
    /// Authenticate with the stored refresh token.
    ///
    /// A credential the provider refuses maps to
    /// [`IngestError::CredentialInvalid`].
    fn connect(&self, credential: &MailCredential) -> Result<Box<dyn MailProvider>, IngestError>;
}
