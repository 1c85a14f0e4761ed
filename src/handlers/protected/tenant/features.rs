// handlers/protected/tenant/features.rs - GET /api/tenant/features handler

use std::collections::BTreeMap;

use axum::extract::Extension;

use crate::database::models::KNOWN_FEATURES;
use crate::middleware::{ApiResponse, ApiResult, ResolvedTenant};

/// Effective feature flags: every catalogue feature plus any tenant-specific
/// override, each resolved through the override map first and the plan second.
pub async fn features_show(
    Extension(ResolvedTenant(tenant)): Extension<ResolvedTenant>,
) -> ApiResult<BTreeMap<String, bool>> {
    let names = KNOWN_FEATURES
        .iter()
        .map(|f| f.to_string())
        .chain(tenant.config.features.keys().cloned());

    let flags = names
        .map(|name| {
            let enabled = tenant.has_feature(&name);
            (name, enabled)
        })
        .collect();
    Ok(ApiResponse::success(flags))
}
