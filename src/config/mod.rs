use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::services::quota_service::FailurePolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub dedicated_pool: DedicatedPoolConfig,
    pub tenancy: TenancyConfig,
    pub quota: QuotaConfig,
    pub rate_limit: RateLimitConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
    /// Run the idempotent table setup at startup.
    pub ensure_schema: bool,
}

/// Bounds for pools opened for tenants on dedicated isolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedicatedPoolConfig {
    pub max_connections: u32,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub acquire_timeout_secs: u64,
}

impl Default for DedicatedPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            idle_timeout_secs: 60,
            max_lifetime_secs: 300,
            acquire_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Host labels that never identify a tenant.
    pub reserved_subdomains: Vec<String>,
    /// When set, only `<label>.<base_domain>` hosts are read as subdomains.
    pub base_domain: Option<String>,
    pub cache_ttl_secs: u64,
    pub onboarding_lock_ttl_secs: u64,
    pub counter_backend: CounterBackend,
    /// How often expired counters, locks and cache rows are deleted.
    pub purge_interval_secs: u64,
}

impl TenancyConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn onboarding_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.onboarding_lock_ttl_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub enabled: bool,
    pub failure_policy: FailurePolicy,
    pub upgrade_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests: i64,
    pub window_secs: u64,
    pub failure_policy: FailurePolicy,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

fn default_reserved() -> Vec<String> {
    ["www", "api", "app", "admin"].iter().map(|s| s.to_string()).collect()
}

fn parse_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("SERVER_REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs = v.parse().unwrap_or(self.server.request_timeout_secs);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_ENSURE_SCHEMA") {
            self.database.ensure_schema = v.parse().unwrap_or(self.database.ensure_schema);
        }

        // Dedicated pool overrides
        if let Ok(v) = env::var("DEDICATED_POOL_MAX_CONNECTIONS") {
            self.dedicated_pool.max_connections = v.parse().unwrap_or(self.dedicated_pool.max_connections);
        }
        if let Ok(v) = env::var("DEDICATED_POOL_IDLE_TIMEOUT_SECS") {
            self.dedicated_pool.idle_timeout_secs = v.parse().unwrap_or(self.dedicated_pool.idle_timeout_secs);
        }
        if let Ok(v) = env::var("DEDICATED_POOL_MAX_LIFETIME_SECS") {
            self.dedicated_pool.max_lifetime_secs = v.parse().unwrap_or(self.dedicated_pool.max_lifetime_secs);
        }

        // Tenancy overrides
        if let Ok(v) = env::var("TENANCY_RESERVED_SUBDOMAINS") {
            self.tenancy.reserved_subdomains = parse_list(&v);
        }
        if let Ok(v) = env::var("TENANCY_BASE_DOMAIN") {
            self.tenancy.base_domain = Some(v.trim().to_ascii_lowercase()).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("TENANCY_CACHE_TTL_SECS") {
            self.tenancy.cache_ttl_secs = v.parse().unwrap_or(self.tenancy.cache_ttl_secs);
        }
        if let Ok(v) = env::var("TENANCY_PURGE_INTERVAL_SECS") {
            self.tenancy.purge_interval_secs = v.parse().unwrap_or(self.tenancy.purge_interval_secs);
        }
        if let Ok(v) = env::var("TENANCY_COUNTER_BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "memory" => self.tenancy.counter_backend = CounterBackend::Memory,
                "postgres" => self.tenancy.counter_backend = CounterBackend::Postgres,
                _ => {}
            }
        }

        // Quota overrides
        if let Ok(v) = env::var("QUOTA_ENABLED") {
            self.quota.enabled = v.parse().unwrap_or(self.quota.enabled);
        }
        if let Ok(v) = env::var("QUOTA_FAILURE_POLICY") {
            self.quota.failure_policy = v.parse().unwrap_or(self.quota.failure_policy);
        }
        if let Ok(v) = env::var("QUOTA_UPGRADE_URL") {
            self.quota.upgrade_url = v;
        }

        // Rate limit overrides
        if let Ok(v) = env::var("RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = v.parse().unwrap_or(self.rate_limit.enabled);
        }
        if let Ok(v) = env::var("RATE_LIMIT_REQUESTS") {
            self.rate_limit.requests = v.parse().unwrap_or(self.rate_limit.requests);
        }
        if let Ok(v) = env::var("RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs = v.parse().unwrap_or(self.rate_limit.window_secs);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = parse_list(&v);
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3000,
                request_timeout_secs: 30,
            },
            database: DatabaseConfig {
                url: "postgres://localhost:5432/tenancy".to_string(),
                max_connections: 10,
                connection_timeout: 30,
                ensure_schema: true,
            },
            dedicated_pool: DedicatedPoolConfig::default(),
            tenancy: TenancyConfig {
                reserved_subdomains: default_reserved(),
                base_domain: None,
                cache_ttl_secs: 300,
                onboarding_lock_ttl_secs: 30,
                counter_backend: CounterBackend::Memory,
                purge_interval_secs: 300,
            },
            quota: QuotaConfig {
                enabled: true,
                failure_policy: FailurePolicy::Open,
                upgrade_url: "http://localhost:5173/billing/upgrade".to_string(),
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                requests: 1000,
                window_secs: 60,
                failure_policy: FailurePolicy::Open,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                jwt_secret: "development-secret-change-me".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
            },
        }
    }

    fn staging() -> Self {
        let dev = Self::development();
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 8080,
                request_timeout_secs: 15,
            },
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
                ..dev.database
            },
            tenancy: TenancyConfig {
                counter_backend: CounterBackend::Postgres,
                ..dev.tenancy
            },
            quota: QuotaConfig {
                upgrade_url: "https://staging.example.com/billing/upgrade".to_string(),
                ..dev.quota
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                requests: 300,
                ..dev.rate_limit
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
            },
            dedicated_pool: dev.dedicated_pool,
        }
    }

    fn production() -> Self {
        let dev = Self::development();
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 8080,
                request_timeout_secs: 10,
            },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 50,
                connection_timeout: 5,
                ensure_schema: false,
            },
            tenancy: TenancyConfig {
                counter_backend: CounterBackend::Postgres,
                ..dev.tenancy
            },
            quota: QuotaConfig {
                upgrade_url: "https://app.example.com/billing/upgrade".to_string(),
                ..dev.quota
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                requests: 120,
                ..dev.rate_limit
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
            },
            dedicated_pool: dev.dedicated_pool,
        }
    }
}

// Global singleton config for the binaries - components receive their sections explicitly
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
