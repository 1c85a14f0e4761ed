use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::database::manager::{is_valid_namespace, quote_identifier};
use crate::database::models::{AuditEntry, Plan, Tenant, TenantConfig, TenantLimits, TenantStatus};

/// Errors from the durable tenant store and the directory built on it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DirectoryError {
    #[error("Tenant directory unavailable: {0}")]
    Unavailable(String),

    #[error("Tenant creation failed: {0}")]
    WriteFailed(String),

    #[error("Invalid tenant input: {0}")]
    InvalidInput(String),

    #[error("Subdomain already taken: {0}")]
    SubdomainTaken(String),

    #[error("Custom domain already taken: {0}")]
    DomainTaken(String),

    #[error("Onboarding already in progress for: {0}")]
    Busy(String),

    #[error("Cannot move tenant from {from} to {to}")]
    InvalidTransition { from: TenantStatus, to: TenantStatus },

    #[error("Tenant not found: {0}")]
    NotFound(Uuid),

    #[error("Corrupt tenant record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

impl DirectoryError {
    fn from_read(err: sqlx::Error) -> Self {
        DirectoryError::Unavailable(err.to_string())
    }

    fn from_write(err: sqlx::Error) -> Self {
        DirectoryError::WriteFailed(err.to_string())
    }
}

/// The one administrative record seeded for every new tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub role: String,
}

impl BootstrapAdmin {
    pub fn new(tenant_id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            email: email.into(),
            role: "admin".to_string(),
        }
    }
}

/// Durable tenant storage. Lookups never return `deleted` tenants.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, DirectoryError>;

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, DirectoryError>;

    async fn find_by_custom_domain(&self, domain: &str) -> Result<Option<Tenant>, DirectoryError>;

    async fn list(&self) -> Result<Vec<Tenant>, DirectoryError>;

    /// Stored status of a tenant, `deleted` included. Never cached.
    async fn status_of(&self, id: Uuid) -> Result<Option<TenantStatus>, DirectoryError>;

    /// Compare-and-set of the status column. Returns `false` when the stored
    /// status is no longer `from`.
    async fn update_status(
        &self,
        id: Uuid,
        from: TenantStatus,
        to: TenantStatus,
    ) -> Result<bool, DirectoryError>;

    async fn update_plan(
        &self,
        id: Uuid,
        plan: Plan,
        limits: &TenantLimits,
    ) -> Result<(), DirectoryError>;

    async fn record_audit(&self, entry: &AuditEntry) -> Result<(), DirectoryError>;

    /// Most recent audit entries of a tenant, newest first.
    async fn audit_log(&self, tenant_id: Uuid, limit: usize) -> Result<Vec<AuditEntry>, DirectoryError>;

    /// Open a write transaction for onboarding.
    async fn begin(&self) -> Result<Box<dyn TenantWriteTx>, DirectoryError>;
}

/// Onboarding transaction. Dropping it without `commit` discards every write.
#[async_trait]
pub trait TenantWriteTx: Send {
    async fn insert_tenant(&mut self, tenant: &Tenant) -> Result<(), DirectoryError>;

    async fn provision_namespace(&mut self, namespace: &str) -> Result<(), DirectoryError>;

    async fn insert_admin(&mut self, admin: &BootstrapAdmin) -> Result<(), DirectoryError>;

    async fn commit(self: Box<Self>) -> Result<(), DirectoryError>;
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tenants (
        id UUID PRIMARY KEY,
        subdomain TEXT NOT NULL,
        display_name TEXT NOT NULL,
        custom_domain TEXT,
        plan TEXT NOT NULL,
        status TEXT NOT NULL,
        config JSONB NOT NULL DEFAULT '{}',
        limits JSONB NOT NULL,
        metadata JSONB NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS tenants_live_subdomain
        ON tenants (lower(subdomain)) WHERE status <> 'deleted'
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS tenants_live_custom_domain
        ON tenants (lower(custom_domain)) WHERE status <> 'deleted' AND custom_domain IS NOT NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tenant_users (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL REFERENCES tenants(id),
        email TEXT NOT NULL,
        role TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_logs (
        id BIGSERIAL PRIMARY KEY,
        tenant_id UUID NOT NULL REFERENCES tenants(id),
        user_id TEXT NOT NULL,
        action TEXT NOT NULL,
        resource TEXT NOT NULL,
        details JSONB NOT NULL DEFAULT '{}',
        ip TEXT,
        user_agent TEXT,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS audit_logs_tenant_time ON audit_logs (tenant_id, timestamp DESC)
    "#,
];

const SELECT_TENANT: &str = r#"
    SELECT id, subdomain, display_name, custom_domain, plan, status,
           config, limits, metadata, created_at
    FROM tenants
"#;

/// PostgreSQL tenant store.
#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), DirectoryError> {
        for ddl in SCHEMA {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(DirectoryError::from_read)?;
        }
        info!("Tenant schema ready");
        Ok(())
    }

    async fn find_one(&self, clause: &str, value: &str) -> Result<Option<Tenant>, DirectoryError> {
        let sql = format!("{} WHERE {} AND status <> 'deleted'", SELECT_TENANT, clause);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(DirectoryError::from_read)?;
        row.as_ref().map(decode_tenant).transpose()
    }
}

fn decode_audit(row: &PgRow) -> Result<AuditEntry, DirectoryError> {
    let tenant_id: Uuid = row.try_get("tenant_id").map_err(DirectoryError::from_read)?;
    let action: String = row.try_get("action").map_err(DirectoryError::from_read)?;
    let Json(details): Json<Value> = row.try_get("details").map_err(DirectoryError::from_read)?;
    Ok(AuditEntry {
        tenant_id,
        user_id: row.try_get("user_id").map_err(DirectoryError::from_read)?,
        action: action
            .parse()
            .map_err(|reason| DirectoryError::Corrupt { id: tenant_id, reason })?,
        resource: row.try_get("resource").map_err(DirectoryError::from_read)?,
        details,
        ip: row.try_get("ip").map_err(DirectoryError::from_read)?,
        user_agent: row.try_get("user_agent").map_err(DirectoryError::from_read)?,
        timestamp: row.try_get("timestamp").map_err(DirectoryError::from_read)?,
    })
}

fn decode_tenant(row: &PgRow) -> Result<Tenant, DirectoryError> {
    let id: Uuid = row.try_get("id").map_err(DirectoryError::from_read)?;
    let corrupt = |reason: String| DirectoryError::Corrupt { id, reason };

    let plan: String = row.try_get("plan").map_err(|e| corrupt(e.to_string()))?;
    let status: String = row.try_get("status").map_err(|e| corrupt(e.to_string()))?;
    let Json(config): Json<TenantConfig> =
        row.try_get("config").map_err(|e| corrupt(e.to_string()))?;
    let Json(limits): Json<TenantLimits> =
        row.try_get("limits").map_err(|e| corrupt(e.to_string()))?;
    let Json(metadata): Json<HashMap<String, Value>> =
        row.try_get("metadata").map_err(|e| corrupt(e.to_string()))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(|e| corrupt(e.to_string()))?;

    Ok(Tenant {
        id,
        subdomain: row.try_get("subdomain").map_err(|e| corrupt(e.to_string()))?,
        display_name: row.try_get("display_name").map_err(|e| corrupt(e.to_string()))?,
        custom_domain: row.try_get("custom_domain").map_err(|e| corrupt(e.to_string()))?,
        plan: plan.parse().map_err(corrupt)?,
        status: status.parse().map_err(corrupt)?,
        config,
        limits,
        created_at,
        metadata,
    })
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, DirectoryError> {
        let sql = format!("{} WHERE id = $1 AND status <> 'deleted'", SELECT_TENANT);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DirectoryError::from_read)?;
        row.as_ref().map(decode_tenant).transpose()
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, DirectoryError> {
        self.find_one("lower(subdomain) = lower($1)", subdomain).await
    }

    async fn find_by_custom_domain(&self, domain: &str) -> Result<Option<Tenant>, DirectoryError> {
        self.find_one("lower(custom_domain) = lower($1)", domain).await
    }

    async fn list(&self) -> Result<Vec<Tenant>, DirectoryError> {
        let sql = format!("{} WHERE status <> 'deleted' ORDER BY created_at", SELECT_TENANT);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(DirectoryError::from_read)?;
        rows.iter().map(decode_tenant).collect()
    }

    async fn status_of(&self, id: Uuid) -> Result<Option<TenantStatus>, DirectoryError> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DirectoryError::from_read)?;
        status
            .map(|s| {
                s.parse()
                    .map_err(|reason| DirectoryError::Corrupt { id, reason })
            })
            .transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: TenantStatus,
        to: TenantStatus,
    ) -> Result<bool, DirectoryError> {
        let result = sqlx::query(
            "UPDATE tenants SET status = $3, updated_at = now() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await
        .map_err(DirectoryError::from_write)?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_plan(
        &self,
        id: Uuid,
        plan: Plan,
        limits: &TenantLimits,
    ) -> Result<(), DirectoryError> {
        let result = sqlx::query(
            "UPDATE tenants SET plan = $2, limits = $3, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(plan.as_str())
        .bind(Json(limits))
        .execute(&self.pool)
        .await
        .map_err(DirectoryError::from_write)?;
        if result.rows_affected() == 0 {
            return Err(DirectoryError::NotFound(id));
        }
        Ok(())
    }

    async fn record_audit(&self, entry: &AuditEntry) -> Result<(), DirectoryError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (tenant_id, user_id, action, resource, details, ip, user_agent, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.tenant_id)
        .bind(&entry.user_id)
        .bind(entry.action.as_str())
        .bind(&entry.resource)
        .bind(Json(&entry.details))
        .bind(&entry.ip)
        .bind(&entry.user_agent)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await
        .map_err(DirectoryError::from_write)?;
        Ok(())
    }

    async fn audit_log(&self, tenant_id: Uuid, limit: usize) -> Result<Vec<AuditEntry>, DirectoryError> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, user_id, action, resource, details, ip, user_agent, timestamp
            FROM audit_logs
            WHERE tenant_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(tenant_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(DirectoryError::from_read)?;
        rows.iter().map(decode_audit).collect()
    }

    async fn begin(&self) -> Result<Box<dyn TenantWriteTx>, DirectoryError> {
        let tx = self.pool.begin().await.map_err(DirectoryError::from_read)?;
        Ok(Box::new(PgTenantTx { tx }))
    }
}

struct PgTenantTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TenantWriteTx for PgTenantTx {
    async fn insert_tenant(&mut self, tenant: &Tenant) -> Result<(), DirectoryError> {
        sqlx::query(
            r#"
            INSERT INTO tenants
                (id, subdomain, display_name, custom_domain, plan, status,
                 config, limits, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(tenant.id)
        .bind(&tenant.subdomain)
        .bind(&tenant.display_name)
        .bind(&tenant.custom_domain)
        .bind(tenant.plan.as_str())
        .bind(tenant.status.as_str())
        .bind(Json(&tenant.config))
        .bind(Json(&tenant.limits))
        .bind(Json(&tenant.metadata))
        .bind(tenant.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.constraint() == Some("tenants_live_custom_domain") => {
                DirectoryError::DomainTaken(tenant.custom_domain.clone().unwrap_or_default())
            }
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DirectoryError::SubdomainTaken(tenant.subdomain.clone())
            }
            _ => DirectoryError::from_write(e),
        })?;
        Ok(())
    }

    async fn provision_namespace(&mut self, namespace: &str) -> Result<(), DirectoryError> {
        if !is_valid_namespace(namespace) {
            return Err(DirectoryError::InvalidInput(format!(
                "invalid namespace '{}'",
                namespace
            )));
        }
        let ddl = format!("CREATE SCHEMA {}", quote_identifier(namespace));
        sqlx::query(&ddl)
            .execute(&mut *self.tx)
            .await
            .map_err(DirectoryError::from_write)?;
        info!("Provisioned namespace {}", namespace);
        Ok(())
    }

    async fn insert_admin(&mut self, admin: &BootstrapAdmin) -> Result<(), DirectoryError> {
        sqlx::query("INSERT INTO tenant_users (id, tenant_id, email, role) VALUES ($1, $2, $3, $4)")
            .bind(admin.id)
            .bind(admin.tenant_id)
            .bind(&admin.email)
            .bind(&admin.role)
            .execute(&mut *self.tx)
            .await
            .map_err(DirectoryError::from_write)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DirectoryError> {
        self.tx.commit().await.map_err(|e| {
            error!("Tenant transaction commit failed: {}", e);
            DirectoryError::from_write(e)
        })
    }
}
