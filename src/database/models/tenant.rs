use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::plan::{feature_enabled, Plan};
use super::usage::Metric;

/// Limit value meaning "no cap".
pub const UNLIMITED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Trial,
    Active,
    Suspended,
    Deleted,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Trial => "trial",
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Deleted => "deleted",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TenantStatus::Trial => 0,
            TenantStatus::Active => 1,
            TenantStatus::Suspended => 2,
            TenantStatus::Deleted => 3,
        }
    }

    /// Status only moves forward: trial, active, suspended, deleted.
    pub fn can_transition_to(&self, next: TenantStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Whether requests for a tenant in this status may reach handlers.
    pub fn is_serving(&self) -> bool {
        matches!(self, TenantStatus::Trial | TenantStatus::Active)
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trial" => Ok(TenantStatus::Trial),
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "deleted" => Ok(TenantStatus::Deleted),
            other => Err(format!("unknown tenant status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    #[default]
    Shared,
    Dedicated,
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" => Ok(IsolationLevel::Shared),
            "dedicated" => Ok(IsolationLevel::Dedicated),
            other => Err(format!("unknown isolation level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branding {
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default = "default_primary_color")]
    pub primary_color: String,
    #[serde(default)]
    pub company_name: Option<String>,
}

fn default_primary_color() -> String {
    "#3B82F6".to_string()
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            logo_url: None,
            primary_color: default_primary_color(),
            company_name: None,
        }
    }
}

fn default_retention_days() -> u32 {
    90
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Per-tenant feature overrides. Absent keys fall back to the plan.
    #[serde(default)]
    pub features: HashMap<String, bool>,
    #[serde(default)]
    pub branding: Branding,
    #[serde(default = "default_retention_days")]
    pub data_retention_days: u32,
    #[serde(default)]
    pub isolation_level: IsolationLevel,
    #[serde(default)]
    pub integrations: HashMap<String, Value>,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            features: HashMap::new(),
            branding: Branding::default(),
            data_retention_days: default_retention_days(),
            isolation_level: IsolationLevel::Shared,
            integrations: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantLimits {
    pub max_users: i64,
    pub max_api_calls_monthly: i64,
    pub max_mcp_agents: i64,
    pub max_whatsapp_messages: i64,
    pub storage_gb: f64,
    #[serde(default)]
    pub custom_limits: HashMap<String, i64>,
}

impl TenantLimits {
    /// Numeric cap for a metered metric, `None` when nothing is configured.
    pub fn limit_for(&self, metric: &Metric) -> Option<i64> {
        match metric {
            Metric::ApiCalls => Some(self.max_api_calls_monthly),
            Metric::McpAgents => Some(self.max_mcp_agents),
            Metric::WhatsappMessages => Some(self.max_whatsapp_messages),
            Metric::Custom(name) => self.custom_limits.get(name).copied(),
        }
    }

    /// Override one named limit. Unknown names land in `custom_limits`.
    pub fn apply_override(&mut self, name: &str, value: i64) {
        match name {
            "max_users" | "users" => self.max_users = value,
            "max_api_calls_monthly" | "api_calls" => self.max_api_calls_monthly = value,
            "max_mcp_agents" | "mcp_agents" => self.max_mcp_agents = value,
            "max_whatsapp_messages" | "whatsapp_messages" => self.max_whatsapp_messages = value,
            other => {
                self.custom_limits.insert(other.to_string(), value);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub subdomain: String,
    pub display_name: String,
    pub custom_domain: Option<String>,
    pub plan: Plan,
    pub status: TenantStatus,
    pub config: TenantConfig,
    pub limits: TenantLimits,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Tenant {
    pub fn has_feature(&self, feature: &str) -> bool {
        feature_enabled(&self.config.features, self.plan, feature)
    }

    pub fn is_dedicated(&self) -> bool {
        self.config.isolation_level == IsolationLevel::Dedicated
    }

    /// Storage namespace used when the tenant runs on dedicated isolation.
    pub fn namespace(&self) -> String {
        namespace_for(self.id)
    }
}

pub fn namespace_for(id: Uuid) -> String {
    format!("tenant_{}", id.simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_moves_forward_only() {
        assert!(TenantStatus::Trial.can_transition_to(TenantStatus::Active));
        assert!(TenantStatus::Trial.can_transition_to(TenantStatus::Suspended));
        assert!(TenantStatus::Active.can_transition_to(TenantStatus::Deleted));
        assert!(!TenantStatus::Suspended.can_transition_to(TenantStatus::Active));
        assert!(!TenantStatus::Active.can_transition_to(TenantStatus::Active));
        assert!(!TenantStatus::Deleted.can_transition_to(TenantStatus::Trial));
    }

    #[test]
    fn config_fills_defaults_from_sparse_json() {
        let config: TenantConfig = serde_json::from_value(json!({
            "isolation_level": "dedicated"
        }))
        .unwrap();
        assert_eq!(config.isolation_level, IsolationLevel::Dedicated);
        assert_eq!(config.data_retention_days, 90);
        assert_eq!(config.branding.primary_color, "#3B82F6");
        assert!(config.features.is_empty());
    }

    #[test]
    fn overrides_target_named_and_custom_limits() {
        let mut limits = Plan::Starter.default_limits();
        limits.apply_override("api_calls", 7_500);
        limits.apply_override("reports", 12);

        assert_eq!(limits.limit_for(&Metric::ApiCalls), Some(7_500));
        assert_eq!(limits.limit_for(&Metric::Custom("reports".into())), Some(12));
        assert_eq!(limits.limit_for(&Metric::Custom("exports".into())), None);
    }

    #[test]
    fn namespace_is_identifier_safe() {
        let id = Uuid::parse_str("6f9619ff-8b86-d011-b42d-00c04fc964ff").unwrap();
        assert_eq!(namespace_for(id), "tenant_6f9619ff8b86d011b42d00c04fc964ff");
    }
}
