use anyhow::Context;
use uuid::Uuid;

use crate::app::Backends;
use crate::config::{AppConfig, CounterBackend};
use crate::database::models::{Actor, Tenant};
use crate::services::{QuotaEnforcer, TenantDirectory};

/// Services the CLI drives directly, without going through HTTP.
pub struct CliContext {
    pub directory: TenantDirectory,
    pub quota: QuotaEnforcer,
    pub counter_backend: CounterBackend,
    pub actor: Actor,
}

impl CliContext {
    pub async fn open(config: &AppConfig) -> anyhow::Result<Self> {
        let backends = Backends::open(config)
            .await
            .context("failed to open the tenant and counter stores")?;
        let directory = TenantDirectory::new(
            backends.tenants,
            backends.counters.clone(),
            config.tenancy.cache_ttl(),
            config.tenancy.onboarding_lock_ttl(),
        );
        let quota = QuotaEnforcer::new(backends.counters, config.quota.clone(), config.rate_limit.clone());
        Ok(Self {
            directory,
            quota,
            counter_backend: config.tenancy.counter_backend,
            actor: operator(),
        })
    }

    /// Look a tenant up by id, or by subdomain when the argument is not a UUID.
    pub async fn find_tenant(&self, reference: &str) -> anyhow::Result<Tenant> {
        let found = match Uuid::parse_str(reference) {
            Ok(id) => self.directory.get(id).await?,
            Err(_) => self.directory.get_by_subdomain(reference).await?,
        };
        found.ok_or_else(|| anyhow::anyhow!("Tenant '{}' not found", reference))
    }
}

/// The local user running the CLI, as recorded in the audit trail.
fn operator() -> Actor {
    let user = std::env::var("USER").unwrap_or_else(|_| "operator".to_string());
    Actor::new(format!("cli:{}", user))
        .with_origin(None, Some(format!("tenancyctl/{}", env!("CARGO_PKG_VERSION"))))
}

/// Usage counters are only reachable from the CLI when they live in
/// PostgreSQL. An in-memory store belongs to the server process.
pub fn require_shared_counters(backend: CounterBackend, command: &str) -> anyhow::Result<()> {
    match backend {
        CounterBackend::Postgres => Ok(()),
        CounterBackend::Memory => anyhow::bail!(
            "`{}` needs TENANCY_COUNTER_BACKEND=postgres; with the memory backend the counters \
             live inside the server process. Use GET/DELETE /api/root/tenants/:id/usage instead.",
            command
        ),
    }
}

/// Cached tenant copies live in the server process with the memory backend,
/// so the CLI cannot evict them.
pub fn warn_private_cache(backend: CounterBackend, ttl_secs: u64) {
    if backend == CounterBackend::Memory {
        tracing::warn!(
            "Tenant cache is in-process (memory backend); running servers keep cached copies for up to {}s",
            ttl_secs
        );
    }
}
