//! Unread-inbox ingestion for one tenant

use std::time::Instant;

use super::{FailureKind, MessageFailure, SyncReport, ThreadAccumulator};
use crate::config::{FailureMode, SyncOptions};
use crate::error::{IngestError, ProviderError};
use crate::gmail::normalize_message;
use crate::models::{Direction, MessageId, TenantId};
use crate::provider::ProviderConnector;
use crate::storage::{MailStore, WriteBatch};

/// Pulls a tenant's unread inbox into the store
///
/// One [`IngestJob::run`] lists the most recent unread inbox messages,
/// maps them into messages and conversations, and commits everything in a
/// single [`WriteBatch`]. On any terminal error nothing is written.
pub struct IngestJob<'a> {
    store: &'a dyn MailStore,
    connector: &'a dyn ProviderConnector,
    options: SyncOptions,
}

impl<'a> IngestJob<'a> {
    pub fn new(
        store: &'a dyn MailStore,
        connector: &'a dyn ProviderConnector,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            connector,
            options,
        }
    }

    /// Run one sync pass for `tenant`
    pub fn run(&self, tenant: &TenantId) -> Result<SyncReport, IngestError> {
        if tenant.as_str().trim().is_empty() {
            return Err(IngestError::Unauthorized);
        }

        let start = Instant::now();
        log::info!("[SYNC] Starting email sync for tenant {}", tenant);

        let credential = self
            .store
            .get_credential(tenant)
            .map_err(IngestError::Store)?
            .ok_or_else(|| IngestError::NotConnected(tenant.clone()))?;
        if credential.usable_refresh_token().is_none() {
            return Err(IngestError::CredentialInvalid(
                "no refresh token stored".to_string(),
            ));
        }

        let retry = &self.options.retry;
        let provider = retry.run_when("token exchange", IngestError::is_transient, || {
            self.connector.connect(&credential)
        })?;

        let account_email = match credential.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => retry
                .run("profile lookup", || provider.profile_email())
                .map_err(terminal)?,
        };

        let limit = self.options.effective_fetch_limit();
        let refs = retry
            .run("unread inbox listing", || provider.list_unread_inbox(limit))
            .map_err(terminal)?;
        log::info!(
            "[SYNC] Listed {} unread inbox messages for tenant {}",
            refs.len(),
            tenant
        );

        let mut report = SyncReport {
            listed: refs.len(),
            ..Default::default()
        };
        let mut threads = ThreadAccumulator::new(refs.len());
        let mut batch = WriteBatch::new();

        for message_ref in &refs {
            let id = MessageId::new(&message_ref.id);

            let fetched = match retry.run("message fetch", || provider.get_message(&id)) {
                Ok(fetched) => fetched,
                Err(e) => {
                    self.message_failed(&mut report, &id, FailureKind::FetchFailed, e)?;
                    continue;
                }
            };

            let message = match normalize_message(fetched, &account_email) {
                Ok(message) => message,
                Err(e) => {
                    let err = ProviderError::malformed(&id, e);
                    self.message_failed(&mut report, &id, FailureKind::ParseFailed, err)?;
                    continue;
                }
            };

            if message.direction == Direction::Outgoing {
                log::debug!("[SYNC] Skipping outbound message {}", id.as_str());
                report.skipped_outbound += 1;
                continue;
            }

            if !threads.record(&message) {
                log::warn!(
                    "[SYNC] Thread limit reached, dropping message {}",
                    id.as_str()
                );
                continue;
            }
            batch.set_message(message);
        }

        for merge in threads.into_merges(self.options.unread_count) {
            batch.merge_conversation(merge);
        }
        report.synced_conversations = batch.conversations().len();
        report.synced_messages = batch.messages().len();

        if !batch.is_empty() {
            self.store.commit(tenant, batch).map_err(|e| {
                log::error!("[SYNC] Commit failed for tenant {}: {:#}", tenant, e);
                IngestError::Store(e)
            })?;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        log::info!(
            "[SYNC] Completed for tenant {}: {} messages in {} conversations, {} outbound skipped, {} failed ({}ms)",
            tenant,
            report.synced_messages,
            report.synced_conversations,
            report.skipped_outbound,
            report.failures.len(),
            report.duration_ms
        );

        Ok(report)
    }

    /// Apply the configured failure mode to a per-message error
    fn message_failed(
        &self,
        report: &mut SyncReport,
        id: &MessageId,
        kind: FailureKind,
        err: ProviderError,
    ) -> Result<(), IngestError> {
        match self.options.on_message_error {
            FailureMode::FailFast => {
                log::error!("[SYNC] Aborting: message {} failed: {}", id.as_str(), err);
                Err(IngestError::Provider(err))
            }
            FailureMode::Isolate => {
                log::warn!("[SYNC] Message {} failed: {}", id.as_str(), err);
                report.failures.push(MessageFailure {
                    message_id: id.as_str().to_string(),
                    kind,
                    detail: err.to_string(),
                });
                Ok(())
            }
        }
    }
}

/// A rejected token on a listing call means the grant is gone
fn terminal(err: ProviderError) -> IngestError {
    match err {
        ProviderError::Unauthorized => IngestError::CredentialInvalid(err.to_string()),
        other => IngestError::Provider(other),
    }
}

/// Run a single pass with cloned options
pub fn sync_tenant(
    store: &dyn MailStore,
    connector: &dyn ProviderConnector,
    options: &SyncOptions,
    tenant: &TenantId,
) -> Result<SyncReport, IngestError> {
    IngestJob::new(store, connector, options.clone()).run(tenant)
}
