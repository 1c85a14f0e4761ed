//! Tenant identification.
//!
//! A request is matched against an ordered list of independent strategies;
//! the first one that finds a tenant wins. Each strategy can also stop the
//! chain outright, which the explicit header does for ids it cannot honour.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::TokenVerifier;
use crate::database::models::{Tenant, TenantStatus};
use crate::database::repository::DirectoryError;
use crate::services::tenant_service::TenantDirectory;

/// Identification inputs pulled off an inbound request.
#[derive(Debug, Clone, Default)]
pub struct TenantHints {
    pub tenant_header: Option<String>,
    pub host: Option<String>,
    pub bearer: Option<String>,
}

impl TenantHints {
    /// Host without port, lowercased.
    pub fn hostname(&self) -> Option<String> {
        let host = self.host.as_deref()?.trim();
        let name = match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        };
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        (!name.is_empty()).then_some(name)
    }
}

#[derive(Debug)]
pub enum StrategyOutcome {
    Found(Tenant),
    /// Nothing here; try the next strategy.
    Miss,
    /// End the chain as not identified.
    Stop,
}

#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, hints: &TenantHints) -> Result<StrategyOutcome, DirectoryError>;
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("Tenant not identified")]
    NotIdentified,

    #[error("Tenant {0} is suspended")]
    Suspended(Uuid),

    #[error("Tenant directory unavailable: {0}")]
    Unavailable(String),
}

/// `X-Tenant-ID` for server-to-server callers. A header that names no live
/// tenant ends resolution instead of falling back to the host.
pub struct HeaderStrategy {
    directory: TenantDirectory,
}

impl HeaderStrategy {
    pub fn new(directory: TenantDirectory) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl ResolutionStrategy for HeaderStrategy {
    fn name(&self) -> &'static str {
        "header"
    }

    async fn resolve(&self, hints: &TenantHints) -> Result<StrategyOutcome, DirectoryError> {
        let Some(raw) = hints.tenant_header.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(StrategyOutcome::Miss);
        };
        let Ok(id) = Uuid::parse_str(raw) else {
            debug!("Malformed tenant header: {}", raw);
            return Ok(StrategyOutcome::Stop);
        };
        Ok(match self.directory.get(id).await? {
            Some(tenant) => StrategyOutcome::Found(tenant),
            None => StrategyOutcome::Stop,
        })
    }
}

/// First host label, e.g. `acme` in `acme.example.com`.
pub struct SubdomainStrategy {
    directory: TenantDirectory,
    reserved: Vec<String>,
    base_domain: Option<String>,
}

impl SubdomainStrategy {
    pub fn new(directory: TenantDirectory, reserved: Vec<String>, base_domain: Option<String>) -> Self {
        Self {
            directory,
            reserved: reserved.into_iter().map(|r| r.to_ascii_lowercase()).collect(),
            base_domain: base_domain.map(|b| b.trim_start_matches('.').to_ascii_lowercase()),
        }
    }

    fn label<'a>(&self, hostname: &'a str) -> Option<&'a str> {
        let label = match &self.base_domain {
            Some(base) => {
                let rest = hostname.strip_suffix(base.as_str())?.strip_suffix('.')?;
                // Only one label in front of the base domain.
                (!rest.contains('.')).then_some(rest)?
            }
            None => {
                let mut parts = hostname.split('.');
                let first = parts.next()?;
                // A bare domain has no subdomain.
                (parts.count() >= 2).then_some(first)?
            }
        };
        if label.is_empty() || self.reserved.iter().any(|r| r == label) {
            return None;
        }
        Some(label)
    }
}

#[async_trait]
impl ResolutionStrategy for SubdomainStrategy {
    fn name(&self) -> &'static str {
        "subdomain"
    }

    async fn resolve(&self, hints: &TenantHints) -> Result<StrategyOutcome, DirectoryError> {
        let Some(hostname) = hints.hostname() else {
            return Ok(StrategyOutcome::Miss);
        };
        let Some(label) = self.label(&hostname) else {
            return Ok(StrategyOutcome::Miss);
        };
        Ok(match self.directory.get_by_subdomain(label).await? {
            Some(tenant) => StrategyOutcome::Found(tenant),
            None => StrategyOutcome::Miss,
        })
    }
}

/// Exact match of the host against a tenant's configured custom domain.
pub struct CustomDomainStrategy {
    directory: TenantDirectory,
}

impl CustomDomainStrategy {
    pub fn new(directory: TenantDirectory) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl ResolutionStrategy for CustomDomainStrategy {
    fn name(&self) -> &'static str {
        "custom_domain"
    }

    async fn resolve(&self, hints: &TenantHints) -> Result<StrategyOutcome, DirectoryError> {
        let Some(hostname) = hints.hostname() else {
            return Ok(StrategyOutcome::Miss);
        };
        Ok(match self.directory.get_by_custom_domain(&hostname).await? {
            Some(tenant) => StrategyOutcome::Found(tenant),
            None => StrategyOutcome::Miss,
        })
    }
}

/// `tenant_id` claim of a verified bearer token.
pub struct SessionClaimStrategy {
    directory: TenantDirectory,
    verifier: Arc<dyn TokenVerifier>,
}

impl SessionClaimStrategy {
    pub fn new(directory: TenantDirectory, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { directory, verifier }
    }
}

#[async_trait]
impl ResolutionStrategy for SessionClaimStrategy {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn resolve(&self, hints: &TenantHints) -> Result<StrategyOutcome, DirectoryError> {
        let Some(token) = hints.bearer.as_deref() else {
            return Ok(StrategyOutcome::Miss);
        };
        let claims = match self.verifier.verify(token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!("Ignoring unverifiable bearer token: {}", e);
                return Ok(StrategyOutcome::Miss);
            }
        };
        let Some(id) = claims.tenant_id else {
            return Ok(StrategyOutcome::Miss);
        };
        Ok(match self.directory.get(id).await? {
            Some(tenant) => StrategyOutcome::Found(tenant),
            None => StrategyOutcome::Miss,
        })
    }
}

/// Runs the strategy chain and applies the status gate.
///
/// Strategies may answer from the directory cache. The gate re-reads the
/// status from durable storage, so a stale cached copy can never admit a
/// suspended tenant.
#[derive(Clone)]
pub struct TenantResolver {
    directory: TenantDirectory,
    strategies: Arc<Vec<Box<dyn ResolutionStrategy>>>,
}

impl TenantResolver {
    pub fn new(directory: TenantDirectory, strategies: Vec<Box<dyn ResolutionStrategy>>) -> Self {
        Self { directory, strategies: Arc::new(strategies) }
    }

    /// Header, subdomain, custom domain, session claim.
    pub fn standard(
        directory: TenantDirectory,
        verifier: Arc<dyn TokenVerifier>,
        reserved: Vec<String>,
        base_domain: Option<String>,
    ) -> Self {
        Self::new(
            directory.clone(),
            vec![
                Box::new(HeaderStrategy::new(directory.clone())),
                Box::new(SubdomainStrategy::new(directory.clone(), reserved, base_domain)),
                Box::new(CustomDomainStrategy::new(directory.clone())),
                Box::new(SessionClaimStrategy::new(directory, verifier)),
            ],
        )
    }

    pub async fn resolve(&self, hints: &TenantHints) -> Result<Tenant, ResolveError> {
        for strategy in self.strategies.iter() {
            let outcome = strategy.resolve(hints).await.map_err(|e| {
                // Fail closed: an unreachable directory never admits a request.
                warn!("Tenant resolution via {} failed: {}", strategy.name(), e);
                ResolveError::Unavailable(e.to_string())
            })?;

            match outcome {
                StrategyOutcome::Found(tenant) => {
                    debug!("Tenant {} resolved via {}", tenant.id, strategy.name());
                    return self.admit(tenant).await;
                }
                StrategyOutcome::Stop => {
                    debug!("Tenant resolution stopped by {}", strategy.name());
                    return Err(ResolveError::NotIdentified);
                }
                StrategyOutcome::Miss => continue,
            }
        }
        Err(ResolveError::NotIdentified)
    }

    async fn admit(&self, mut tenant: Tenant) -> Result<Tenant, ResolveError> {
        let status = self.directory.durable_status(&tenant).await.map_err(|e| {
            warn!("Status check for tenant {} failed: {}", tenant.id, e);
            ResolveError::Unavailable(e.to_string())
        })?;
        match status {
            Some(TenantStatus::Suspended) => Err(ResolveError::Suspended(tenant.id)),
            None | Some(TenantStatus::Deleted) => Err(ResolveError::NotIdentified),
            Some(status @ (TenantStatus::Trial | TenantStatus::Active)) => {
                tenant.status = status;
                Ok(tenant)
            }
        }
    }
}
