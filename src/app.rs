use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::HeaderValue,
    middleware,
    routing::{delete, get, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::JwtVerifier;
use crate::config::{AppConfig, CounterBackend};
use crate::database::manager::{ConnectionPoolManager, DatabaseError, PgPoolFactory};
use crate::database::repository::{DirectoryError, PgTenantStore, TenantStore};
use crate::handlers::{elevated, protected, public};
use crate::middleware::{enforce_quota_middleware, require_root, resolve_tenant_middleware};
use crate::services::{QuotaEnforcer, TenantDirectory, TenantResolver};
use crate::store::{CounterStore, MemoryCounterStore, PgCounterStore, StoreError};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Durable backends shared by the server and the CLI.
pub struct Backends {
    pub pool: PgPool,
    pub tenants: Arc<PgTenantStore>,
    pub counters: Arc<dyn CounterStore>,
}

impl Backends {
    /// Open the shared pool (lazily) and the stores on top of it, running the
    /// idempotent table setup when configured.
    pub async fn open(config: &AppConfig) -> Result<Self, BootstrapError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_secs(config.database.connection_timeout))
            .connect_lazy(&config.database.url)
            .map_err(DatabaseError::from)?;

        let tenants = Arc::new(PgTenantStore::new(pool.clone()));
        if config.database.ensure_schema {
            tenants.ensure_schema().await?;
        }

        let counters: Arc<dyn CounterStore> = match config.tenancy.counter_backend {
            CounterBackend::Memory => Arc::new(MemoryCounterStore::new()),
            CounterBackend::Postgres => {
                let store = PgCounterStore::new(pool.clone());
                if config.database.ensure_schema {
                    store.ensure_schema().await?;
                }
                Arc::new(store)
            }
        };
        tracing::info!("Counter store backend: {:?}", config.tenancy.counter_backend);

        Ok(Self { pool, tenants, counters })
    }
}

/// Everything the request path needs. Built once at startup and cloned into
/// every handler; no component reaches for a global.
#[derive(Clone)]
pub struct AppState {
    pub directory: TenantDirectory,
    pub resolver: TenantResolver,
    pub quota: QuotaEnforcer,
    pub pools: Arc<ConnectionPoolManager<PgPoolFactory>>,
    pub verifier: Arc<JwtVerifier>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        tenants: Arc<dyn TenantStore>,
        counters: Arc<dyn CounterStore>,
        pools: ConnectionPoolManager<PgPoolFactory>,
        verifier: Arc<JwtVerifier>,
    ) -> Self {
        let directory = TenantDirectory::new(
            tenants,
            counters.clone(),
            config.tenancy.cache_ttl(),
            config.tenancy.onboarding_lock_ttl(),
        );
        let resolver = TenantResolver::standard(
            directory.clone(),
            verifier.clone(),
            config.tenancy.reserved_subdomains.clone(),
            config.tenancy.base_domain.clone(),
        );
        let quota = QuotaEnforcer::new(counters, config.quota.clone(), config.rate_limit.clone());

        Self {
            directory,
            resolver,
            quota,
            pools: Arc::new(pools),
            verifier,
        }
    }
}

/// Full application router with no extra tenant-scoped routes.
pub fn router(state: AppState, config: &AppConfig) -> Router {
    router_with(state, config, Router::new())
}

/// Full application router. `domain` routes are mounted behind tenant
/// resolution and quota enforcement alongside the built-in tenant routes.
pub fn router_with(state: AppState, config: &AppConfig, domain: Router<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/", get(public::home))
        .route("/health", get(public::health))
        .route("/plans", get(public::plans));

    let root_routes = Router::new()
        .route(
            "/api/root/tenants",
            get(elevated::tenant::tenant_list).post(elevated::tenant::tenant_create),
        )
        .route("/api/root/tenants/:id", get(elevated::tenant::tenant_show))
        .route("/api/root/tenants/:id/status", put(elevated::tenant::tenant_status))
        .route("/api/root/tenants/:id/plan", put(elevated::tenant::tenant_plan))
        .route(
            "/api/root/tenants/:id/usage",
            get(elevated::tenant::usage_show),
        )
        .route(
            "/api/root/tenants/:id/usage/:metric",
            delete(elevated::tenant::usage_reset),
        )
        .route("/api/root/tenants/:id/audit", get(elevated::tenant::audit_list))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_root));

    // Layers added later run first: resolution, then quota, then the handler.
    let tenant_routes = Router::new()
        .route("/api/tenant", get(protected::tenant::tenant_show))
        .route("/api/tenant/features", get(protected::tenant::features_show))
        .route("/api/tenant/usage", get(protected::tenant::usage_show))
        .route("/api/tenant/limits/:metric", get(protected::tenant::limit_check))
        .merge(domain)
        .route_layer(middleware::from_fn_with_state(state.clone(), enforce_quota_middleware))
        .route_layer(middleware::from_fn_with_state(state.clone(), resolve_tenant_middleware));

    Router::new()
        .merge(public_routes)
        .merge(root_routes)
        .merge(tenant_routes)
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if !config.security.enable_cors {
        return CorsLayer::new();
    }
    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    if origins.is_empty() || config.security.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
