pub mod audit;
pub mod plan;
pub mod tenant;
pub mod usage;

pub use audit::{Actor, AuditAction, AuditEntry};
pub use plan::{catalogue, feature_enabled, FeatureSet, Plan, PlanSummary, KNOWN_FEATURES};
pub use tenant::{
    namespace_for, Branding, IsolationLevel, Tenant, TenantConfig, TenantLimits, TenantStatus,
    UNLIMITED,
};
pub use usage::{Metric, MetricUsage, UsagePeriod, UsageReport, PERIOD_GRACE};
