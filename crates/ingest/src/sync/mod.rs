//! Sync engine for pulling unread mail into the store
//!
//! A pass commits its writes in one batch, so a failed pass can simply be
//! re-run.

mod accumulator;
mod job;
mod locks;
mod report;
mod retry;

pub use accumulator::ThreadAccumulator;
pub use job::{IngestJob, sync_tenant};
pub use locks::{TenantLease, TenantLocks};
pub use report::{FailureKind, MessageFailure, SyncReport};
pub use retry::RetryPolicy;
