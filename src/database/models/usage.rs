use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Serialize, Serializer};

/// How long a usage counter outlives the end of its period.
pub const PERIOD_GRACE: Duration = Duration::from_secs(24 * 60 * 60);

/// Calendar month a usage counter belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsagePeriod {
    pub label: String,
    pub ends_at: DateTime<Utc>,
}

impl UsagePeriod {
    pub fn containing(now: DateTime<Utc>) -> Self {
        let (year, month) = if now.month() == 12 {
            (now.year() + 1, 1)
        } else {
            (now.year(), now.month() + 1)
        };
        let ends_at = Utc
            .with_ymd_and_hms(year, month, 1, 0, 0, 0)
            .single()
            .unwrap_or(now);
        Self {
            label: now.format("%Y-%m").to_string(),
            ends_at,
        }
    }

    /// Counter lifetime when first armed at `now`: the rest of the period
    /// plus `PERIOD_GRACE`, so a counter never lapses while its key is current.
    pub fn ttl_from(&self, now: DateTime<Utc>) -> Duration {
        (self.ends_at - now).to_std().unwrap_or(Duration::ZERO) + PERIOD_GRACE
    }
}

/// A metered resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Metric {
    ApiCalls,
    McpAgents,
    WhatsappMessages,
    Custom(String),
}

impl Metric {
    pub const METERED: [Metric; 3] = [Metric::ApiCalls, Metric::McpAgents, Metric::WhatsappMessages];

    pub fn as_str(&self) -> &str {
        match self {
            Metric::ApiCalls => "api_calls",
            Metric::McpAgents => "mcp_agents",
            Metric::WhatsappMessages => "whatsapp_messages",
            Metric::Custom(name) => name,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid metric name '{}'", s));
        }
        Ok(match s {
            "api_calls" => Metric::ApiCalls,
            "mcp_agents" => Metric::McpAgents,
            "whatsapp_messages" => Metric::WhatsappMessages,
            other => Metric::Custom(other.to_string()),
        })
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Usage of one metric in the current period.
#[derive(Debug, Clone, Serialize)]
pub struct MetricUsage {
    pub metric: Metric,
    pub current: i64,
    pub limit: Option<i64>,
    pub unlimited: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub tenant_id: uuid::Uuid,
    pub plan: super::plan::Plan,
    pub period: UsagePeriod,
    pub metrics: Vec<MetricUsage>,
}
