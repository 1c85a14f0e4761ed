use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::tenant::{TenantLimits, UNLIMITED};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Trial,
    #[serde(alias = "gratis")]
    Free,
    Starter,
    Growth,
    Scale,
}

/// Features a plan grants when the tenant has no explicit override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSet {
    All,
    Only(&'static [&'static str]),
}

impl FeatureSet {
    pub fn contains(&self, feature: &str) -> bool {
        match self {
            FeatureSet::All => true,
            FeatureSet::Only(features) => features.contains(&feature),
        }
    }
}

/// Every feature flag the platform knows about.
pub const KNOWN_FEATURES: &[&str] = &[
    "whatsapp_basic",
    "whatsapp_advanced",
    "analytics_basic",
    "analytics_advanced",
    "analysis_basic",
    "analysis_advanced",
    "api_access",
    "custom_branding",
    "multiple_agents",
];

const BASIC_FEATURES: &[&str] = &["whatsapp_basic", "analytics_basic", "analysis_basic"];

const STARTER_FEATURES: &[&str] = &[
    "whatsapp_basic",
    "whatsapp_advanced",
    "analytics_basic",
    "analytics_advanced",
    "analysis_basic",
    "analysis_advanced",
    "api_access",
];

const GROWTH_FEATURES: &[&str] = &[
    "whatsapp_basic",
    "whatsapp_advanced",
    "analytics_basic",
    "analytics_advanced",
    "analysis_basic",
    "analysis_advanced",
    "api_access",
    "custom_branding",
    "multiple_agents",
];

impl Plan {
    pub const ALL: [Plan; 5] = [Plan::Trial, Plan::Free, Plan::Starter, Plan::Growth, Plan::Scale];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Trial => "trial",
            Plan::Free => "free",
            Plan::Starter => "starter",
            Plan::Growth => "growth",
            Plan::Scale => "scale",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Plan::Trial => "Trial",
            Plan::Free => "Free",
            Plan::Starter => "Starter",
            Plan::Growth => "Growth",
            Plan::Scale => "Scale",
        }
    }

    /// Monthly price in Colombian pesos.
    pub fn monthly_price_cop(&self) -> i64 {
        match self {
            Plan::Trial | Plan::Free => 0,
            Plan::Starter => 49_900,
            Plan::Growth => 149_900,
            Plan::Scale => 499_900,
        }
    }

    pub fn default_limits(&self) -> TenantLimits {
        let (max_users, api_calls, mcp_agents, whatsapp, storage_gb) = match self {
            Plan::Trial => (1, 100, 1, 50, 1.0),
            Plan::Free => (1, 100, 3, 50, 1.0),
            Plan::Starter => (5, 5_000, 10, 1_000, 10.0),
            Plan::Growth => (20, 25_000, 50, 5_000, 50.0),
            Plan::Scale => (100, UNLIMITED, UNLIMITED, UNLIMITED, 500.0),
        };
        TenantLimits {
            max_users,
            max_api_calls_monthly: api_calls,
            max_mcp_agents: mcp_agents,
            max_whatsapp_messages: whatsapp,
            storage_gb,
            custom_limits: HashMap::new(),
        }
    }

    pub fn default_features(&self) -> FeatureSet {
        match self {
            Plan::Trial | Plan::Free => FeatureSet::Only(BASIC_FEATURES),
            Plan::Starter => FeatureSet::Only(STARTER_FEATURES),
            Plan::Growth => FeatureSet::Only(GROWTH_FEATURES),
            Plan::Scale => FeatureSet::All,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trial" => Ok(Plan::Trial),
            "free" | "gratis" => Ok(Plan::Free),
            "starter" => Ok(Plan::Starter),
            "growth" => Ok(Plan::Growth),
            "scale" => Ok(Plan::Scale),
            other => Err(format!("unknown plan '{}'", other)),
        }
    }
}

/// Two-tier feature resolution: the tenant's own override wins, otherwise the
/// plan table decides.
pub fn feature_enabled(overrides: &HashMap<String, bool>, plan: Plan, feature: &str) -> bool {
    match overrides.get(feature) {
        Some(enabled) => *enabled,
        None => plan.default_features().contains(feature),
    }
}

/// Public description of a plan for the catalogue endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub name: Plan,
    pub display_name: &'static str,
    pub monthly_price_cop: i64,
    pub limits: TenantLimits,
    pub features: Vec<&'static str>,
}

impl From<Plan> for PlanSummary {
    fn from(plan: Plan) -> Self {
        let features = KNOWN_FEATURES
            .iter()
            .copied()
            .filter(|f| plan.default_features().contains(f))
            .collect();
        Self {
            name: plan,
            display_name: plan.display_name(),
            monthly_price_cop: plan.monthly_price_cop(),
            limits: plan.default_limits(),
            features,
        }
    }
}

pub fn catalogue() -> Vec<PlanSummary> {
    Plan::ALL.into_iter().map(PlanSummary::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_has_five_thousand_api_calls() {
        assert_eq!(Plan::Starter.default_limits().max_api_calls_monthly, 5_000);
    }

    #[test]
    fn scale_is_unlimited_for_metered_resources() {
        let limits = Plan::Scale.default_limits();
        assert_eq!(limits.max_api_calls_monthly, UNLIMITED);
        assert_eq!(limits.max_mcp_agents, UNLIMITED);
        assert_eq!(limits.max_whatsapp_messages, UNLIMITED);
    }

    #[test]
    fn parses_legacy_plan_name() {
        assert_eq!("gratis".parse::<Plan>().unwrap(), Plan::Free);
        assert_eq!("Growth".parse::<Plan>().unwrap(), Plan::Growth);
        assert!("enterprise".parse::<Plan>().is_err());
    }

    #[test]
    fn override_beats_plan_default() {
        let mut overrides = HashMap::new();
        assert!(!feature_enabled(&overrides, Plan::Free, "custom_branding"));

        overrides.insert("custom_branding".to_string(), true);
        assert!(feature_enabled(&overrides, Plan::Free, "custom_branding"));

        overrides.insert("api_access".to_string(), false);
        assert!(!feature_enabled(&overrides, Plan::Scale, "api_access"));
    }

    #[test]
    fn scale_grants_unknown_features() {
        assert!(feature_enabled(&HashMap::new(), Plan::Scale, "anything_new"));
        assert!(!feature_enabled(&HashMap::new(), Plan::Growth, "anything_new"));
    }

    #[test]
    fn catalogue_lists_every_plan() {
        let plans = catalogue();
        assert_eq!(plans.len(), 5);
        assert_eq!(plans[4].features.len(), KNOWN_FEATURES.len());
    }
}
