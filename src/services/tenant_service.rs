use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::models::{
    Actor, AuditAction, AuditEntry, IsolationLevel, Plan, Tenant, TenantConfig, TenantStatus,
};
use crate::database::repository::{BootstrapAdmin, DirectoryError, TenantStore};
use crate::store::{CounterStore, LockGuard};

/// Input for onboarding a tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenantInput {
    pub subdomain: String,
    pub display_name: String,
    #[serde(default = "default_plan")]
    pub plan: Plan,
    pub owner_email: String,
    #[serde(default)]
    pub isolation_level: IsolationLevel,
    #[serde(default)]
    pub custom_domain: Option<String>,
    #[serde(default)]
    pub limit_overrides: HashMap<String, i64>,
    #[serde(default)]
    pub features: HashMap<String, bool>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

fn default_plan() -> Plan {
    Plan::Trial
}

impl CreateTenantInput {
    pub fn new(subdomain: impl Into<String>, display_name: impl Into<String>, owner_email: impl Into<String>) -> Self {
        Self {
            subdomain: subdomain.into(),
            display_name: display_name.into(),
            plan: default_plan(),
            owner_email: owner_email.into(),
            isolation_level: IsolationLevel::Shared,
            custom_domain: None,
            limit_overrides: HashMap::new(),
            features: HashMap::new(),
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantSummary {
    pub id: Uuid,
    pub subdomain: String,
    pub display_name: String,
    pub plan: Plan,
    pub status: TenantStatus,
    pub isolation_level: IsolationLevel,
}

impl From<&Tenant> for TenantSummary {
    fn from(t: &Tenant) -> Self {
        Self {
            id: t.id,
            subdomain: t.subdomain.clone(),
            display_name: t.display_name.clone(),
            plan: t.plan,
            status: t.status,
            isolation_level: t.config.isolation_level,
        }
    }
}

fn id_key(id: Uuid) -> String {
    format!("tenant:id:{}", id)
}

fn subdomain_key(subdomain: &str) -> String {
    format!("tenant:subdomain:{}", subdomain.to_ascii_lowercase())
}

fn domain_key(domain: &str) -> String {
    format!("tenant:domain:{}", domain.to_ascii_lowercase())
}

/// Subdomain labels: 2 to 63 chars of [a-z0-9-], not starting or ending with '-'.
pub fn is_valid_subdomain(label: &str) -> bool {
    (2..=63).contains(&label.len())
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Tenant records with a read-through cache in front of durable storage.
///
/// The cache is advisory. Durable storage is the source of truth, every write
/// path invalidates the tenant's keys, and cache faults fall through to the
/// store with a warning.
#[derive(Clone)]
pub struct TenantDirectory {
    store: Arc<dyn TenantStore>,
    cache: Arc<dyn CounterStore>,
    cache_ttl: Duration,
    lock_ttl: Duration,
}

impl TenantDirectory {
    pub fn new(
        store: Arc<dyn TenantStore>,
        cache: Arc<dyn CounterStore>,
        cache_ttl: Duration,
        lock_ttl: Duration,
    ) -> Self {
        Self { store, cache, cache_ttl, lock_ttl }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Tenant>, DirectoryError> {
        let store = self.store.clone();
        self.read_through(&id_key(id), async move { store.find_by_id(id).await })
            .await
    }

    pub async fn get_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, DirectoryError> {
        let store = self.store.clone();
        let sub = subdomain.to_ascii_lowercase();
        self.read_through(&subdomain_key(subdomain), async move {
            store.find_by_subdomain(&sub).await
        })
        .await
    }

    pub async fn get_by_custom_domain(&self, domain: &str) -> Result<Option<Tenant>, DirectoryError> {
        let store = self.store.clone();
        let host = domain.to_ascii_lowercase();
        self.read_through(&domain_key(domain), async move {
            store.find_by_custom_domain(&host).await
        })
        .await
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Every non-deleted tenant. Always read from durable storage.
    pub async fn list(&self) -> Result<Vec<Tenant>, DirectoryError> {
        self.store.list().await
    }

    async fn read_through<F>(&self, key: &str, load: F) -> Result<Option<Tenant>, DirectoryError>
    where
        F: std::future::Future<Output = Result<Option<Tenant>, DirectoryError>>,
    {
        match self.cache.cache_get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Tenant>(&raw) {
                Ok(tenant) if tenant.status != TenantStatus::Deleted => {
                    debug!("Tenant cache hit: {}", key);
                    return Ok(Some(tenant));
                }
                Ok(_) => {}
                Err(e) => warn!("Discarding undecodable cache entry {}: {}", key, e),
            },
            Ok(None) => {}
            Err(e) => warn!("Tenant cache read failed for {}: {}", key, e),
        }

        let tenant = load.await?;
        if let Some(tenant) = &tenant {
            self.populate(key, tenant).await;
        }
        Ok(tenant)
    }

    async fn populate(&self, key: &str, tenant: &Tenant) {
        let raw = match serde_json::to_string(tenant) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to encode tenant {} for cache: {}", tenant.id, e);
                return;
            }
        };
        if let Err(e) = self.cache.cache_set(key, &raw, self.cache_ttl).await {
            warn!("Tenant cache write failed for {}: {}", key, e);
        }
    }

    /// Drop the cached entry for `id`. Subdomain and domain keys of a known
    /// tenant are dropped by [`TenantDirectory::invalidate_tenant`].
    pub async fn invalidate(&self, id: Uuid) {
        self.evict(&id_key(id)).await;
    }

    pub async fn invalidate_tenant(&self, tenant: &Tenant) {
        self.evict(&id_key(tenant.id)).await;
        self.evict(&subdomain_key(&tenant.subdomain)).await;
        if let Some(domain) = &tenant.custom_domain {
            self.evict(&domain_key(domain)).await;
        }
    }

    async fn evict(&self, key: &str) {
        if let Err(e) = self.cache.cache_delete(key).await {
            warn!("Tenant cache invalidation failed for {}: {}", key, e);
        }
    }

    /// Current status straight from durable storage, bypassing the cache.
    /// A cached copy of `tenant` that disagrees is evicted. `None` means the
    /// row is gone.
    pub async fn durable_status(&self, tenant: &Tenant) -> Result<Option<TenantStatus>, DirectoryError> {
        let status = self.store.status_of(tenant.id).await?;
        if status != Some(tenant.status) {
            debug!("Evicting stale cache entries of tenant {}", tenant.id);
            self.invalidate_tenant(tenant).await;
        }
        Ok(status)
    }

    /// Append to the tenant's audit trail. A failed write is logged and does
    /// not undo the change it describes.
    pub async fn audit(&self, tenant_id: Uuid, actor: &Actor, action: AuditAction, details: Value) {
        let entry = AuditEntry::new(tenant_id, actor, action, "tenant", details);
        if let Err(e) = self.store.record_audit(&entry).await {
            warn!("Failed to record {} for tenant {}: {}", action.as_str(), tenant_id, e);
        }
    }

    pub async fn audit_log(&self, tenant_id: Uuid, limit: usize) -> Result<Vec<AuditEntry>, DirectoryError> {
        self.store.audit_log(tenant_id, limit).await
    }

    /// Onboard a tenant. The tenant row, its dedicated namespace and the
    /// bootstrap admin are written in one transaction; any failure leaves no
    /// trace of the tenant.
    pub async fn create(&self, input: CreateTenantInput, actor: &Actor) -> Result<Tenant, DirectoryError> {
        let subdomain = input.subdomain.trim().to_ascii_lowercase();
        if !is_valid_subdomain(&subdomain) {
            return Err(DirectoryError::InvalidInput(format!(
                "subdomain '{}' must be 2-63 characters of a-z, 0-9 and '-'",
                input.subdomain
            )));
        }
        if input.display_name.trim().is_empty() {
            return Err(DirectoryError::InvalidInput("display_name is required".to_string()));
        }
        if !input.owner_email.contains('@') {
            return Err(DirectoryError::InvalidInput("owner_email must be an email address".to_string()));
        }
        let custom_domain = input
            .custom_domain
            .as_deref()
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty());

        // Serialize concurrent onboarding of the same subdomain across processes.
        let guard = match LockGuard::acquire(
            self.cache.clone(),
            format!("lock:onboard:{}", subdomain),
            self.lock_ttl,
        )
        .await
        {
            Ok(Some(guard)) => Some(guard),
            Ok(None) => return Err(DirectoryError::Busy(subdomain)),
            Err(e) => {
                // The unique index still rejects duplicates.
                warn!("Onboarding lock unavailable for {}: {}", subdomain, e);
                None
            }
        };

        let result = self.create_locked(input, subdomain, custom_domain, actor).await;

        if let Some(guard) = guard {
            if let Err(e) = guard.release().await {
                warn!("Failed to release onboarding lock: {}", e);
            }
        }
        result
    }

    async fn create_locked(
        &self,
        input: CreateTenantInput,
        subdomain: String,
        custom_domain: Option<String>,
        actor: &Actor,
    ) -> Result<Tenant, DirectoryError> {
        if self.store.find_by_subdomain(&subdomain).await?.is_some() {
            return Err(DirectoryError::SubdomainTaken(subdomain));
        }
        if let Some(domain) = &custom_domain {
            if self.store.find_by_custom_domain(domain).await?.is_some() {
                return Err(DirectoryError::DomainTaken(domain.clone()));
            }
        }

        let mut limits = input.plan.default_limits();
        for (name, value) in &input.limit_overrides {
            limits.apply_override(name, *value);
        }
        let status = match input.plan {
            Plan::Trial => TenantStatus::Trial,
            _ => TenantStatus::Active,
        };

        let tenant = Tenant {
            id: Uuid::new_v4(),
            subdomain,
            display_name: input.display_name.trim().to_string(),
            custom_domain,
            plan: input.plan,
            status,
            config: TenantConfig {
                features: input.features,
                isolation_level: input.isolation_level,
                ..TenantConfig::default()
            },
            limits,
            created_at: Utc::now(),
            metadata: input.metadata,
        };

        // Dropping the transaction on any early return rolls it back.
        let mut tx = self.store.begin().await?;
        tx.insert_tenant(&tenant).await?;
        if tenant.is_dedicated() {
            tx.provision_namespace(&tenant.namespace()).await?;
        }
        tx.insert_admin(&BootstrapAdmin::new(tenant.id, input.owner_email.trim()))
            .await?;
        tx.commit().await?;

        self.invalidate_tenant(&tenant).await;
        info!(
            "Created tenant {} ({}) on plan {} with {:?} isolation",
            tenant.subdomain, tenant.id, tenant.plan, tenant.config.isolation_level
        );
        self.audit(
            tenant.id,
            actor,
            AuditAction::TenantCreated,
            json!({
                "subdomain": tenant.subdomain,
                "plan": tenant.plan,
                "isolation_level": tenant.config.isolation_level,
            }),
        )
        .await;
        Ok(tenant)
    }

    /// Move a tenant forward through its lifecycle. The write is a
    /// compare-and-set on the status read, so concurrent transitions can
    /// never move a tenant backwards. The cache is invalidated before
    /// returning so the next request sees the new status.
    pub async fn set_status(&self, id: Uuid, status: TenantStatus, actor: &Actor) -> Result<Tenant, DirectoryError> {
        let mut tenant = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(DirectoryError::NotFound(id))?;

        let mut current = tenant.status;
        loop {
            if !current.can_transition_to(status) {
                return Err(DirectoryError::InvalidTransition { from: current, to: status });
            }
            if self.store.update_status(id, current, status).await? {
                break;
            }
            // Another transition won; it can only have moved the status forward.
            current = self
                .store
                .status_of(id)
                .await?
                .ok_or(DirectoryError::NotFound(id))?;
        }

        self.invalidate_tenant(&tenant).await;
        info!("Tenant {} status {} -> {}", id, current, status);
        self.audit(
            id,
            actor,
            AuditAction::StatusChanged,
            json!({ "from": current, "to": status }),
        )
        .await;

        tenant.status = status;
        Ok(tenant)
    }

    /// Switch plan. Limits are reset to the new plan's defaults.
    pub async fn change_plan(&self, id: Uuid, plan: Plan, actor: &Actor) -> Result<Tenant, DirectoryError> {
        let mut tenant = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(DirectoryError::NotFound(id))?;

        let limits = plan.default_limits();
        self.store.update_plan(id, plan, &limits).await?;
        self.invalidate_tenant(&tenant).await;
        info!("Tenant {} plan {} -> {}", id, tenant.plan, plan);
        self.audit(
            id,
            actor,
            AuditAction::PlanChanged,
            json!({ "from": tenant.plan, "to": plan }),
        )
        .await;

        tenant.plan = plan;
        tenant.limits = limits;
        Ok(tenant)
    }
}
