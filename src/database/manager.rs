use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DedicatedPoolConfig;
use crate::database::models::Tenant;

/// Errors from the connection pool manager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid tenant namespace: {0}")]
    InvalidNamespace(String),

    #[error("Failed to open dedicated pool for tenant {tenant}: {reason}")]
    PoolCreation { tenant: Uuid, reason: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Builds dedicated data-layer handles for tenants on dedicated isolation.
#[async_trait]
pub trait PoolFactory: Send + Sync {
    type Handle: Clone + Send + Sync + 'static;

    async fn dedicated(&self, tenant: &Tenant) -> Result<Self::Handle, DatabaseError>;
}

/// Hands out the data-layer handle for a tenant.
///
/// Shared tenants all get the one shared handle. Dedicated tenants get a
/// handle of their own, created on first access and kept for the life of the
/// process.
pub struct ConnectionPoolManager<F: PoolFactory> {
    shared: F::Handle,
    dedicated: Arc<RwLock<HashMap<Uuid, F::Handle>>>,
    factory: F,
}

impl<F: PoolFactory> ConnectionPoolManager<F> {
    pub fn new(shared: F::Handle, factory: F) -> Self {
        Self {
            shared,
            dedicated: Arc::new(RwLock::new(HashMap::new())),
            factory,
        }
    }

    pub fn shared(&self) -> &F::Handle {
        &self.shared
    }

    pub async fn get_connection(&self, tenant: &Tenant) -> Result<F::Handle, DatabaseError> {
        if !tenant.is_dedicated() {
            return Ok(self.shared.clone());
        }

        // Fast path: try read lock
        {
            let pools = self.dedicated.read().await;
            if let Some(handle) = pools.get(&tenant.id) {
                return Ok(handle.clone());
            }
        }

        // The write guard covers re-check, construct and register so two
        // first requests cannot both build a pool.
        let mut pools = self.dedicated.write().await;
        if let Some(handle) = pools.get(&tenant.id) {
            debug!("Dedicated pool for {} created by a concurrent request", tenant.id);
            return Ok(handle.clone());
        }

        let handle = self.factory.dedicated(tenant).await?;
        pools.insert(tenant.id, handle.clone());
        info!("Created dedicated pool for tenant {} ({})", tenant.subdomain, tenant.id);
        Ok(handle)
    }

    /// Number of dedicated handles currently registered.
    pub async fn dedicated_count(&self) -> usize {
        self.dedicated.read().await.len()
    }
}

impl ConnectionPoolManager<PgPoolFactory> {
    /// Close every dedicated pool and then the shared one (e.g., on shutdown)
    pub async fn close_all(&self) {
        let mut pools = self.dedicated.write().await;
        for (id, pool) in pools.drain() {
            pool.close().await;
            info!("Closed dedicated pool for tenant {}", id);
        }
        self.shared.close().await;
    }

    /// Pings the shared pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.shared).await?;
        Ok(())
    }
}

/// Opens dedicated PostgreSQL pools whose `search_path` is the tenant namespace.
pub struct PgPoolFactory {
    base: PgConnectOptions,
    settings: DedicatedPoolConfig,
}

impl PgPoolFactory {
    pub fn new(database_url: &str, settings: DedicatedPoolConfig) -> Result<Self, DatabaseError> {
        url::Url::parse(database_url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        let base = PgConnectOptions::from_str(database_url)?;
        Ok(Self { base, settings })
    }
}

#[async_trait]
impl PoolFactory for PgPoolFactory {
    type Handle = PgPool;

    async fn dedicated(&self, tenant: &Tenant) -> Result<PgPool, DatabaseError> {
        let namespace = tenant.namespace();
        if !is_valid_namespace(&namespace) {
            return Err(DatabaseError::InvalidNamespace(namespace));
        }

        let options = self.base.clone().options([("search_path", namespace.as_str())]);
        // Lazy: no I/O under the registry lock, connections open on first query.
        let pool = PgPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .min_connections(0)
            .idle_timeout(Duration::from_secs(self.settings.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(self.settings.max_lifetime_secs))
            .acquire_timeout(Duration::from_secs(self.settings.acquire_timeout_secs))
            .connect_lazy_with(options);
        Ok(pool)
    }
}

/// Quote SQL identifier to prevent injection
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Tenant namespaces are `tenant_` followed by [a-zA-Z0-9_]+
pub fn is_valid_namespace(name: &str) -> bool {
    match name.strip_prefix("tenant_") {
        Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::IsolationLevel;
    use crate::testing::tenant_fixture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out numbered handles and counts how many it built.
    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
    }

    #[async_trait]
    impl PoolFactory for CountingFactory {
        type Handle = Arc<usize>;

        async fn dedicated(&self, _tenant: &Tenant) -> Result<Arc<usize>, DatabaseError> {
            // Yield so concurrent callers interleave inside the critical section.
            tokio::task::yield_now().await;
            Ok(Arc::new(self.created.fetch_add(1, Ordering::SeqCst) + 1))
        }
    }

    fn dedicated_tenant() -> Tenant {
        let mut tenant = tenant_fixture("acme");
        tenant.config.isolation_level = IsolationLevel::Dedicated;
        tenant
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_access_creates_one_handle() {
        let manager = Arc::new(ConnectionPoolManager::new(Arc::new(0), CountingFactory::default()));
        let tenant = dedicated_tenant();

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let manager = manager.clone();
                let tenant = tenant.clone();
                tokio::spawn(async move { manager.get_connection(&tenant).await })
            })
            .collect();

        let handles: Vec<Arc<usize>> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(manager.factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(manager.dedicated_count().await, 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    }

    #[tokio::test]
    async fn shared_tenants_get_the_shared_handle() {
        let shared = Arc::new(0);
        let manager = ConnectionPoolManager::new(shared.clone(), CountingFactory::default());

        let handle = manager.get_connection(&tenant_fixture("plain")).await.unwrap();
        assert!(Arc::ptr_eq(&handle, &shared));
        assert_eq!(manager.dedicated_count().await, 0);
    }

    #[tokio::test]
    async fn dedicated_tenants_are_kept_apart() {
        let manager = ConnectionPoolManager::new(Arc::new(0), CountingFactory::default());
        let a = dedicated_tenant();
        let b = dedicated_tenant();

        let first = manager.get_connection(&a).await.unwrap();
        let again = manager.get_connection(&a).await.unwrap();
        let other = manager.get_connection(&b).await.unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(manager.dedicated_count().await, 2);
    }

    #[test]
    fn validates_namespaces() {
        assert!(is_valid_namespace("tenant_123abc_DEF"));
        assert!(!is_valid_namespace("tenant_"));
        assert!(!is_valid_namespace("public"));
        assert!(!is_valid_namespace("tenant-123"));
        assert!(!is_valid_namespace("tenant_; DROP SCHEMA"));
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_identifier("tenant_a"), "\"tenant_a\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[tokio::test]
    async fn pg_factory_rejects_bad_url() {
        let err = PgPoolFactory::new("not a url", DedicatedPoolConfig::default()).err();
        assert!(matches!(err, Some(DatabaseError::InvalidDatabaseUrl)));
    }
}
