use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{QuotaConfig, RateLimitConfig};
use crate::database::models::{Metric, MetricUsage, Tenant, UsagePeriod, UsageReport, UNLIMITED};
use crate::store::{CounterStore, StoreError};

/// What to do when the counter store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Admit the request and log.
    Open,
    /// Surface the store error to the caller.
    Closed,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(FailurePolicy::Open),
            "closed" => Ok(FailurePolicy::Closed),
            other => Err(format!("unknown failure policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DenyReason {
    /// Long-window plan quota. Retrying will not help without an upgrade.
    PlanLimit,
    /// Short-window throttle. Retry after the window rolls over.
    RateLimit,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::PlanLimit => "QUOTA_EXCEEDED",
            DenyReason::RateLimit => "RATE_LIMIT_EXCEEDED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub reason: DenyReason,
    pub metric: String,
    pub current: i64,
    pub limit: i64,
    pub retry_after: Option<Duration>,
    pub upgrade_url: Option<String>,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for {} ({}/{})", self.reason.code(), self.metric, self.current, self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow,
    Deny(Denial),
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allow)
    }
}

/// Read-only answer to "may this tenant consume one more unit of `metric`?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitProbe {
    pub metric: Metric,
    pub allowed: bool,
    pub current: i64,
    pub limit: Option<i64>,
    pub unlimited: bool,
}

fn usage_key(tenant: &Tenant, metric: &Metric, period: &UsagePeriod) -> String {
    format!("usage:{}:{}:{}", tenant.id, metric.as_str(), period.label)
}

fn rate_key(tenant: &Tenant, client: &str) -> String {
    format!("ratelimit:{}:{}", tenant.id, client)
}

/// Plan quota gate and per-client rate limiter on top of the counter store.
#[derive(Clone)]
pub struct QuotaEnforcer {
    store: Arc<dyn CounterStore>,
    quota: QuotaConfig,
    rate_limit: RateLimitConfig,
}

impl QuotaEnforcer {
    pub fn new(store: Arc<dyn CounterStore>, quota: QuotaConfig, rate_limit: RateLimitConfig) -> Self {
        Self { store, quota, rate_limit }
    }

    pub fn quota_enabled(&self) -> bool {
        self.quota.enabled
    }

    /// Read-only check of one metric against the tenant's limit.
    pub async fn check(&self, tenant: &Tenant, metric: &Metric) -> Result<QuotaDecision, StoreError> {
        self.check_at(tenant, metric, Utc::now()).await
    }

    async fn check_at(
        &self,
        tenant: &Tenant,
        metric: &Metric,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision, StoreError> {
        let limit = match tenant.limits.limit_for(metric) {
            None | Some(UNLIMITED) => return Ok(QuotaDecision::Allow),
            Some(limit) => limit,
        };

        let period = UsagePeriod::containing(now);
        let current = self.store.get_count(&usage_key(tenant, metric, &period)).await?;
        if current >= limit {
            return Ok(QuotaDecision::Deny(Denial {
                reason: DenyReason::PlanLimit,
                metric: metric.as_str().to_string(),
                current,
                limit,
                retry_after: None,
                upgrade_url: Some(self.quota.upgrade_url.clone()),
            }));
        }
        Ok(QuotaDecision::Allow)
    }

    /// Count one unit of `metric` against the current period.
    pub async fn record(&self, tenant: &Tenant, metric: &Metric) -> Result<i64, StoreError> {
        self.record_at(tenant, metric, Utc::now()).await
    }

    async fn record_at(&self, tenant: &Tenant, metric: &Metric, now: DateTime<Utc>) -> Result<i64, StoreError> {
        let period = UsagePeriod::containing(now);
        let key = usage_key(tenant, metric, &period);
        let window = self.store.increment_with_window(&key, period.ttl_from(now)).await?;
        Ok(window.count)
    }

    /// Gate a request consuming `metrics`. Every metric is checked before any
    /// is recorded; admitted requests are counted up front and never refunded.
    ///
    /// Store failures follow the quota failure policy: `Open` admits with a
    /// warning, `Closed` returns the error.
    pub async fn admit(&self, tenant: &Tenant, metrics: &[Metric]) -> Result<QuotaDecision, StoreError> {
        self.admit_at(tenant, metrics, Utc::now()).await
    }

    async fn admit_at(
        &self,
        tenant: &Tenant,
        metrics: &[Metric],
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision, StoreError> {
        if !self.quota.enabled {
            return Ok(QuotaDecision::Allow);
        }

        for metric in metrics {
            match self.check_at(tenant, metric, now).await {
                Ok(QuotaDecision::Allow) => {}
                Ok(QuotaDecision::Deny(denial)) => {
                    info!("Tenant {} denied: {}", tenant.id, denial);
                    return Ok(QuotaDecision::Deny(denial));
                }
                Err(e) => return self.on_store_failure(self.quota.failure_policy, tenant, e),
            }
        }

        for metric in metrics {
            if matches!(tenant.limits.limit_for(metric), None | Some(UNLIMITED)) {
                continue;
            }
            if let Err(e) = self.record_at(tenant, metric, now).await {
                // Already admitted; a lost increment only under-counts.
                warn!("Failed to record {} for tenant {}: {}", metric, tenant.id, e);
            }
        }
        Ok(QuotaDecision::Allow)
    }

    /// Fixed-window throttle per (tenant, client).
    pub async fn check_rate(&self, tenant: &Tenant, client: &str) -> Result<QuotaDecision, StoreError> {
        if !self.rate_limit.enabled {
            return Ok(QuotaDecision::Allow);
        }

        let window = match self
            .store
            .increment_with_window(&rate_key(tenant, client), self.rate_limit.window())
            .await
        {
            Ok(window) => window,
            Err(e) => return self.on_store_failure(self.rate_limit.failure_policy, tenant, e),
        };

        if window.count > self.rate_limit.requests {
            let denial = Denial {
                reason: DenyReason::RateLimit,
                metric: "requests".to_string(),
                current: window.count - 1,
                limit: self.rate_limit.requests,
                retry_after: Some(window.ttl_remaining),
                upgrade_url: None,
            };
            info!("Tenant {} client {} throttled: {}", tenant.id, client, denial);
            return Ok(QuotaDecision::Deny(denial));
        }
        Ok(QuotaDecision::Allow)
    }

    fn on_store_failure(
        &self,
        policy: FailurePolicy,
        tenant: &Tenant,
        err: StoreError,
    ) -> Result<QuotaDecision, StoreError> {
        match policy {
            FailurePolicy::Open => {
                warn!("Counter store failed for tenant {}, admitting: {}", tenant.id, err);
                Ok(QuotaDecision::Allow)
            }
            FailurePolicy::Closed => Err(err),
        }
    }

    /// Like `check`, but always reports the current count and never
    /// increments. Store errors are returned as-is.
    pub async fn probe(&self, tenant: &Tenant, metric: &Metric) -> Result<LimitProbe, StoreError> {
        let limit = tenant.limits.limit_for(metric);
        let period = UsagePeriod::containing(Utc::now());
        let current = self.store.get_count(&usage_key(tenant, metric, &period)).await?;
        let allowed = match limit {
            None | Some(UNLIMITED) => true,
            Some(limit) => current < limit,
        };
        Ok(LimitProbe {
            metric: metric.clone(),
            allowed,
            current,
            limit,
            unlimited: limit == Some(UNLIMITED),
        })
    }

    /// Current-period usage of every metered metric and custom limit.
    pub async fn usage(&self, tenant: &Tenant) -> Result<UsageReport, StoreError> {
        let period = UsagePeriod::containing(Utc::now());
        let mut metrics: Vec<Metric> = Metric::METERED.to_vec();
        let mut custom: Vec<&String> = tenant.limits.custom_limits.keys().collect();
        custom.sort();
        metrics.extend(custom.into_iter().map(|name| Metric::Custom(name.clone())));

        let keys: Vec<String> = metrics.iter().map(|m| usage_key(tenant, m, &period)).collect();
        let counts = join_all(keys.iter().map(|key| self.store.get_count(key))).await;

        let mut usage = Vec::with_capacity(metrics.len());
        for (metric, count) in metrics.into_iter().zip(counts) {
            let limit = tenant.limits.limit_for(&metric);
            usage.push(MetricUsage {
                current: count?,
                unlimited: limit == Some(UNLIMITED),
                limit,
                metric,
            });
        }

        Ok(UsageReport {
            tenant_id: tenant.id,
            plan: tenant.plan,
            period,
            metrics: usage,
        })
    }

    /// Drop the current-period counter of one metric.
    pub async fn reset(&self, tenant: &Tenant, metric: &Metric) -> Result<(), StoreError> {
        let period = UsagePeriod::containing(Utc::now());
        self.store.reset(&usage_key(tenant, metric, &period)).await?;
        info!("Reset {} usage for tenant {}", metric, tenant.id);
        Ok(())
    }
}
