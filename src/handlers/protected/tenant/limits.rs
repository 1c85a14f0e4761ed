// handlers/protected/tenant/limits.rs - GET /api/tenant/limits/:metric handler

use axum::extract::{Extension, Path, State};

use crate::app::AppState;
use crate::database::models::Metric;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, ResolvedTenant};
use crate::services::LimitProbe;

/// Read-only limit probe. The request itself is metered as an API call, the
/// probed metric is not incremented.
pub async fn limit_check(
    State(state): State<AppState>,
    Path(metric): Path<String>,
    Extension(ResolvedTenant(tenant)): Extension<ResolvedTenant>,
) -> ApiResult<LimitProbe> {
    let metric: Metric = metric.parse().map_err(ApiError::bad_request)?;
    let probe = state.quota.probe(&tenant, &metric).await?;
    Ok(ApiResponse::success(probe))
}
