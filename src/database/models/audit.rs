use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Who performed an administrative change, and from where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ip: None,
            user_agent: None,
        }
    }

    pub fn with_origin(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip = ip;
        self.user_agent = user_agent;
        self
    }
}

/// Tenant lifecycle actions written to the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    TenantCreated,
    StatusChanged,
    PlanChanged,
    UsageReset,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::TenantCreated => "tenant_created",
            AuditAction::StatusChanged => "status_changed",
            AuditAction::PlanChanged => "plan_changed",
            AuditAction::UsageReset => "usage_reset",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tenant_created" => Ok(AuditAction::TenantCreated),
            "status_changed" => Ok(AuditAction::StatusChanged),
            "plan_changed" => Ok(AuditAction::PlanChanged),
            "usage_reset" => Ok(AuditAction::UsageReset),
            other => Err(format!("unknown audit action '{}'", other)),
        }
    }
}

/// One row of a tenant's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub tenant_id: Uuid,
    pub user_id: String,
    pub action: AuditAction,
    pub resource: String,
    pub details: Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(tenant_id: Uuid, actor: &Actor, action: AuditAction, resource: &str, details: Value) -> Self {
        Self {
            tenant_id,
            user_id: actor.user_id.clone(),
            action,
            resource: resource.to_string(),
            details,
            ip: actor.ip.clone(),
            user_agent: actor.user_agent.clone(),
            timestamp: Utc::now(),
        }
    }
}
