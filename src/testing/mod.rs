//! Fixtures and fault-injecting stores for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Barrier, Notify};
use uuid::Uuid;

use crate::database::memory::MemoryTenantStore;
use crate::database::models::{AuditEntry, Plan, Tenant, TenantConfig, TenantLimits, TenantStatus};
use crate::database::repository::{BootstrapAdmin, DirectoryError, TenantStore, TenantWriteTx};
use crate::store::{CounterStore, LockToken, StoreError, WindowCount};

/// An active `free` tenant on shared isolation with a fresh id.
pub fn tenant_fixture(subdomain: &str) -> Tenant {
    Tenant {
        id: Uuid::new_v4(),
        subdomain: subdomain.to_string(),
        display_name: format!("{} Inc", subdomain),
        custom_domain: None,
        plan: Plan::Free,
        status: TenantStatus::Active,
        config: TenantConfig::default(),
        limits: Plan::Free.default_limits(),
        created_at: Utc::now(),
        metadata: HashMap::new(),
    }
}

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

/// Counter store whose every call fails.
pub struct FailingCounterStore;

#[async_trait]
impl CounterStore for FailingCounterStore {
    async fn increment_with_window(&self, _: &str, _: Duration) -> Result<WindowCount, StoreError> {
        Err(down())
    }

    async fn get_count(&self, _: &str) -> Result<i64, StoreError> {
        Err(down())
    }

    async fn reset(&self, _: &str) -> Result<(), StoreError> {
        Err(down())
    }

    async fn try_acquire_lock(&self, _: &str, _: Duration) -> Result<Option<LockToken>, StoreError> {
        Err(down())
    }

    async fn release_lock(&self, _: &str, _: &LockToken) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn cache_set(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreError> {
        Err(down())
    }

    async fn cache_get(&self, _: &str) -> Result<Option<String>, StoreError> {
        Err(down())
    }

    async fn cache_delete(&self, _: &str) -> Result<(), StoreError> {
        Err(down())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Err(down())
    }
}

/// Tenant store whose every call reports the directory unavailable.
pub struct FailingTenantStore;

fn unavailable() -> DirectoryError {
    DirectoryError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl TenantStore for FailingTenantStore {
    async fn find_by_id(&self, _: Uuid) -> Result<Option<Tenant>, DirectoryError> {
        Err(unavailable())
    }

    async fn find_by_subdomain(&self, _: &str) -> Result<Option<Tenant>, DirectoryError> {
        Err(unavailable())
    }

    async fn find_by_custom_domain(&self, _: &str) -> Result<Option<Tenant>, DirectoryError> {
        Err(unavailable())
    }

    async fn list(&self) -> Result<Vec<Tenant>, DirectoryError> {
        Err(unavailable())
    }

    async fn status_of(&self, _: Uuid) -> Result<Option<TenantStatus>, DirectoryError> {
        Err(unavailable())
    }

    async fn update_status(&self, _: Uuid, _: TenantStatus, _: TenantStatus) -> Result<bool, DirectoryError> {
        Err(unavailable())
    }

    async fn update_plan(&self, _: Uuid, _: Plan, _: &TenantLimits) -> Result<(), DirectoryError> {
        Err(unavailable())
    }

    async fn record_audit(&self, _: &AuditEntry) -> Result<(), DirectoryError> {
        Err(unavailable())
    }

    async fn audit_log(&self, _: Uuid, _: usize) -> Result<Vec<AuditEntry>, DirectoryError> {
        Err(unavailable())
    }

    async fn begin(&self) -> Result<Box<dyn TenantWriteTx>, DirectoryError> {
        Err(unavailable())
    }
}

/// Memory store whose transactions fail while seeding the bootstrap admin,
/// after the tenant row has been written.
pub struct FailingAdminStore {
    inner: MemoryTenantStore,
}

impl FailingAdminStore {
    pub fn new(inner: MemoryTenantStore) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl TenantStore for FailingAdminStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, DirectoryError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, DirectoryError> {
        self.inner.find_by_subdomain(subdomain).await
    }

    async fn find_by_custom_domain(&self, domain: &str) -> Result<Option<Tenant>, DirectoryError> {
        self.inner.find_by_custom_domain(domain).await
    }

    async fn list(&self) -> Result<Vec<Tenant>, DirectoryError> {
        self.inner.list().await
    }

    async fn status_of(&self, id: Uuid) -> Result<Option<TenantStatus>, DirectoryError> {
        self.inner.status_of(id).await
    }

    async fn update_status(&self, id: Uuid, from: TenantStatus, to: TenantStatus) -> Result<bool, DirectoryError> {
        self.inner.update_status(id, from, to).await
    }

    async fn update_plan(&self, id: Uuid, plan: Plan, limits: &TenantLimits) -> Result<(), DirectoryError> {
        self.inner.update_plan(id, plan, limits).await
    }

    async fn record_audit(&self, entry: &AuditEntry) -> Result<(), DirectoryError> {
        self.inner.record_audit(entry).await
    }

    async fn audit_log(&self, tenant_id: Uuid, limit: usize) -> Result<Vec<AuditEntry>, DirectoryError> {
        self.inner.audit_log(tenant_id, limit).await
    }

    async fn begin(&self) -> Result<Box<dyn TenantWriteTx>, DirectoryError> {
        Ok(Box::new(FailingAdminTx { inner: self.inner.begin().await? }))
    }
}

struct FailingAdminTx {
    inner: Box<dyn TenantWriteTx>,
}

#[async_trait]
impl TenantWriteTx for FailingAdminTx {
    async fn insert_tenant(&mut self, tenant: &Tenant) -> Result<(), DirectoryError> {
        self.inner.insert_tenant(tenant).await
    }

    async fn provision_namespace(&mut self, namespace: &str) -> Result<(), DirectoryError> {
        self.inner.provision_namespace(namespace).await
    }

    async fn insert_admin(&mut self, _: &BootstrapAdmin) -> Result<(), DirectoryError> {
        Err(DirectoryError::WriteFailed("tenant_users insert failed".to_string()))
    }

    async fn commit(self: Box<Self>) -> Result<(), DirectoryError> {
        self.inner.commit().await
    }
}

/// Memory store with hooks that hold reads open, to line up concurrent
/// callers deterministically.
///
/// `find_by_id` waits on `id_reads` after loading, so every caller has read
/// before any proceeds. The first `find_by_subdomain` signals `loaded` after
/// loading and then waits for `resume`.
pub struct GatedTenantStore {
    inner: MemoryTenantStore,
    id_reads: Option<Barrier>,
    stall_subdomain: AtomicBool,
    pub loaded: Notify,
    pub resume: Notify,
}

impl GatedTenantStore {
    /// `find_by_id` callers proceed in groups of `callers`.
    pub fn lockstep_id_reads(inner: MemoryTenantStore, callers: usize) -> Self {
        Self {
            inner,
            id_reads: Some(Barrier::new(callers)),
            stall_subdomain: AtomicBool::new(false),
            loaded: Notify::new(),
            resume: Notify::new(),
        }
    }

    /// The first `find_by_subdomain` stalls between its read and its return.
    pub fn stalled_subdomain_read(inner: MemoryTenantStore) -> Self {
        Self {
            inner,
            id_reads: None,
            stall_subdomain: AtomicBool::new(true),
            loaded: Notify::new(),
            resume: Notify::new(),
        }
    }
}

#[async_trait]
impl TenantStore for GatedTenantStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, DirectoryError> {
        let found = self.inner.find_by_id(id).await;
        if let Some(barrier) = &self.id_reads {
            barrier.wait().await;
        }
        found
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, DirectoryError> {
        let found = self.inner.find_by_subdomain(subdomain).await;
        if self.stall_subdomain.swap(false, Ordering::SeqCst) {
            self.loaded.notify_one();
            self.resume.notified().await;
        }
        found
    }

    async fn find_by_custom_domain(&self, domain: &str) -> Result<Option<Tenant>, DirectoryError> {
        self.inner.find_by_custom_domain(domain).await
    }

    async fn list(&self) -> Result<Vec<Tenant>, DirectoryError> {
        self.inner.list().await
    }

    async fn status_of(&self, id: Uuid) -> Result<Option<TenantStatus>, DirectoryError> {
        self.inner.status_of(id).await
    }

    async fn update_status(&self, id: Uuid, from: TenantStatus, to: TenantStatus) -> Result<bool, DirectoryError> {
        self.inner.update_status(id, from, to).await
    }

    async fn update_plan(&self, id: Uuid, plan: Plan, limits: &TenantLimits) -> Result<(), DirectoryError> {
        self.inner.update_plan(id, plan, limits).await
    }

    async fn record_audit(&self, entry: &AuditEntry) -> Result<(), DirectoryError> {
        self.inner.record_audit(entry).await
    }

    async fn audit_log(&self, tenant_id: Uuid, limit: usize) -> Result<Vec<AuditEntry>, DirectoryError> {
        self.inner.audit_log(tenant_id, limit).await
    }

    async fn begin(&self) -> Result<Box<dyn TenantWriteTx>, DirectoryError> {
        self.inner.begin().await
    }
}
