//! Single-flight guard per tenant

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::TenantId;

type ActiveSet = Arc<Mutex<HashSet<TenantId>>>;

/// Tenants with a sync in flight
///
/// Cloning shares the same set.
#[derive(Debug, Clone, Default)]
pub struct TenantLocks {
    active: ActiveSet,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the tenant, or None if a sync for it is already running
    pub fn try_acquire(&self, tenant: &TenantId) -> Option<TenantLease> {
        if !lock(&self.active).insert(tenant.clone()) {
            return None;
        }
        Some(TenantLease {
            tenant: tenant.clone(),
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_running(&self, tenant: &TenantId) -> bool {
        lock(&self.active).contains(tenant)
    }
}

/// Held while a tenant's sync runs; released on drop
#[derive(Debug)]
pub struct TenantLease {
    tenant: TenantId,
    active: ActiveSet,
}

impl TenantLease {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }
}

impl Drop for TenantLease {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.tenant);
    }
}

fn lock(active: &ActiveSet) -> MutexGuard<'_, HashSet<TenantId>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}
