pub mod quota_service;
pub mod resolver;
pub mod tenant_service;

pub use quota_service::{DenyReason, Denial, FailurePolicy, LimitProbe, QuotaDecision, QuotaEnforcer};
pub use resolver::{ResolveError, ResolutionStrategy, StrategyOutcome, TenantHints, TenantResolver};
pub use tenant_service::{CreateTenantInput, TenantDirectory, TenantSummary};
