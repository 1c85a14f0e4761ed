use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::database::models::{AuditEntry, Plan, Tenant, TenantLimits, TenantStatus};
use crate::database::repository::{BootstrapAdmin, DirectoryError, TenantStore, TenantWriteTx};

#[derive(Default)]
struct State {
    tenants: HashMap<Uuid, Tenant>,
    admins: Vec<BootstrapAdmin>,
    namespaces: HashSet<String>,
    audit: Vec<AuditEntry>,
}

impl State {
    fn live(&self) -> impl Iterator<Item = &Tenant> {
        self.tenants.values().filter(|t| t.status != TenantStatus::Deleted)
    }

    /// Uniqueness error `tenant` would raise against the live tenants.
    fn conflict(&self, tenant: &Tenant) -> Option<DirectoryError> {
        if self
            .live()
            .any(|t| t.subdomain.eq_ignore_ascii_case(&tenant.subdomain))
        {
            return Some(DirectoryError::SubdomainTaken(tenant.subdomain.clone()));
        }
        let domain = tenant.custom_domain.as_deref()?;
        self.live()
            .any(|t| {
                t.custom_domain
                    .as_deref()
                    .is_some_and(|d| d.eq_ignore_ascii_case(domain))
            })
            .then(|| DirectoryError::DomainTaken(domain.to_string()))
    }
}

/// In-process tenant store for development and tests.
#[derive(Clone, Default)]
pub struct MemoryTenantStore {
    state: Arc<Mutex<State>>,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, bypassing onboarding. Used to seed fixtures.
    pub async fn seed(&self, tenant: Tenant) {
        self.state.lock().await.tenants.insert(tenant.id, tenant);
    }

    /// Every stored record, deleted ones included.
    pub async fn tenant_count(&self) -> usize {
        self.state.lock().await.tenants.len()
    }

    pub async fn admins_for(&self, tenant_id: Uuid) -> Vec<BootstrapAdmin> {
        let state = self.state.lock().await;
        state.admins.iter().filter(|a| a.tenant_id == tenant_id).cloned().collect()
    }

    pub async fn has_namespace(&self, namespace: &str) -> bool {
        self.state.lock().await.namespaces.contains(namespace)
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, DirectoryError> {
        let state = self.state.lock().await;
        let found = state.live().find(|t| t.id == id).cloned();
        Ok(found)
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, DirectoryError> {
        let state = self.state.lock().await;
        let found = state
            .live()
            .find(|t| t.subdomain.eq_ignore_ascii_case(subdomain))
            .cloned();
        Ok(found)
    }

    async fn find_by_custom_domain(&self, domain: &str) -> Result<Option<Tenant>, DirectoryError> {
        let state = self.state.lock().await;
        let found = state
            .live()
            .find(|t| {
                t.custom_domain
                    .as_deref()
                    .is_some_and(|d| d.eq_ignore_ascii_case(domain))
            })
            .cloned();
        Ok(found)
    }

    async fn list(&self) -> Result<Vec<Tenant>, DirectoryError> {
        let state = self.state.lock().await;
        let mut tenants: Vec<Tenant> = state.live().cloned().collect();
        tenants.sort_by_key(|t| t.created_at);
        Ok(tenants)
    }

    async fn status_of(&self, id: Uuid) -> Result<Option<TenantStatus>, DirectoryError> {
        let state = self.state.lock().await;
        let status = state.tenants.get(&id).map(|t| t.status);
        Ok(status)
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: TenantStatus,
        to: TenantStatus,
    ) -> Result<bool, DirectoryError> {
        let mut state = self.state.lock().await;
        let tenant = state.tenants.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
        if tenant.status != from {
            return Ok(false);
        }
        tenant.status = to;
        Ok(true)
    }

    async fn update_plan(
        &self,
        id: Uuid,
        plan: Plan,
        limits: &TenantLimits,
    ) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().await;
        let tenant = state.tenants.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
        tenant.plan = plan;
        tenant.limits = limits.clone();
        Ok(())
    }

    async fn record_audit(&self, entry: &AuditEntry) -> Result<(), DirectoryError> {
        self.state.lock().await.audit.push(entry.clone());
        Ok(())
    }

    async fn audit_log(&self, tenant_id: Uuid, limit: usize) -> Result<Vec<AuditEntry>, DirectoryError> {
        let state = self.state.lock().await;
        let entries = state
            .audit
            .iter()
            .rev()
            .filter(|e| e.tenant_id == tenant_id)
            .take(limit)
            .cloned()
            .collect();
        Ok(entries)
    }

    async fn begin(&self) -> Result<Box<dyn TenantWriteTx>, DirectoryError> {
        Ok(Box::new(MemoryTenantTx {
            state: self.state.clone(),
            tenants: Vec::new(),
            admins: Vec::new(),
            namespaces: Vec::new(),
        }))
    }
}

/// Buffers writes and applies them in one step on commit.
struct MemoryTenantTx {
    state: Arc<Mutex<State>>,
    tenants: Vec<Tenant>,
    admins: Vec<BootstrapAdmin>,
    namespaces: Vec<String>,
}

#[async_trait]
impl TenantWriteTx for MemoryTenantTx {
    async fn insert_tenant(&mut self, tenant: &Tenant) -> Result<(), DirectoryError> {
        if let Some(conflict) = self.state.lock().await.conflict(tenant) {
            return Err(conflict);
        }
        self.tenants.push(tenant.clone());
        Ok(())
    }

    async fn provision_namespace(&mut self, namespace: &str) -> Result<(), DirectoryError> {
        if self.state.lock().await.namespaces.contains(namespace) {
            return Err(DirectoryError::WriteFailed(format!(
                "namespace {} already exists",
                namespace
            )));
        }
        self.namespaces.push(namespace.to_string());
        Ok(())
    }

    async fn insert_admin(&mut self, admin: &BootstrapAdmin) -> Result<(), DirectoryError> {
        self.admins.push(admin.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DirectoryError> {
        let MemoryTenantTx { state, tenants, admins, namespaces } = *self;
        let mut state = state.lock().await;
        // Re-check under the commit lock; another transaction may have won.
        for tenant in &tenants {
            if let Some(conflict) = state.conflict(tenant) {
                return Err(conflict);
            }
        }
        for tenant in tenants {
            state.tenants.insert(tenant.id, tenant);
        }
        state.admins.extend(admins);
        state.namespaces.extend(namespaces);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tenant_fixture;

    #[tokio::test]
    async fn uncommitted_writes_are_invisible() {
        let store = MemoryTenantStore::new();
        let tenant = tenant_fixture("acme");

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_tenant(&tenant).await.unwrap();
            tx.insert_admin(&BootstrapAdmin::new(tenant.id, "owner@acme.test"))
                .await
                .unwrap();
        }

        assert_eq!(store.tenant_count().await, 0);
        assert!(store.admins_for(tenant.id).await.is_empty());
    }

    #[tokio::test]
    async fn deleted_tenants_are_hidden_and_free_their_subdomain() {
        let store = MemoryTenantStore::new();
        let mut old = tenant_fixture("acme");
        old.status = TenantStatus::Deleted;
        store.seed(old.clone()).await;

        assert!(store.find_by_id(old.id).await.unwrap().is_none());
        assert!(store.find_by_subdomain("acme").await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        tx.insert_tenant(&tenant_fixture("acme")).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.find_by_subdomain("ACME").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn commit_rejects_a_subdomain_taken_meanwhile() {
        let store = MemoryTenantStore::new();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.insert_tenant(&tenant_fixture("acme")).await.unwrap();
        second.insert_tenant(&tenant_fixture("acme")).await.unwrap();

        first.commit().await.unwrap();
        assert_eq!(
            second.commit().await,
            Err(DirectoryError::SubdomainTaken("acme".to_string()))
        );
        assert_eq!(store.tenant_count().await, 1);
    }

    #[tokio::test]
    async fn commit_rejects_a_custom_domain_taken_meanwhile() {
        let store = MemoryTenantStore::new();
        let mut first = tenant_fixture("acme");
        first.custom_domain = Some("shop.acme.co".to_string());
        let mut second = tenant_fixture("other");
        second.custom_domain = Some("SHOP.acme.co".to_string());

        let mut tx_a = store.begin().await.unwrap();
        let mut tx_b = store.begin().await.unwrap();
        tx_a.insert_tenant(&first).await.unwrap();
        tx_b.insert_tenant(&second).await.unwrap();

        tx_a.commit().await.unwrap();
        assert_eq!(
            tx_b.commit().await,
            Err(DirectoryError::DomainTaken("SHOP.acme.co".to_string()))
        );
        assert_eq!(store.tenant_count().await, 1);
    }

    #[tokio::test]
    async fn status_update_is_compare_and_set() {
        let store = MemoryTenantStore::new();
        let tenant = tenant_fixture("acme");
        store.seed(tenant.clone()).await;

        assert!(store
            .update_status(tenant.id, TenantStatus::Active, TenantStatus::Deleted)
            .await
            .unwrap());
        assert!(!store
            .update_status(tenant.id, TenantStatus::Active, TenantStatus::Suspended)
            .await
            .unwrap());
        assert_eq!(store.status_of(tenant.id).await.unwrap(), Some(TenantStatus::Deleted));
    }
}
