// handlers/protected/tenant/usage.rs - GET /api/tenant/usage handler

use axum::extract::{Extension, State};

use crate::app::AppState;
use crate::database::models::UsageReport;
use crate::middleware::{ApiResponse, ApiResult, ResolvedTenant};

pub async fn usage_show(
    State(state): State<AppState>,
    Extension(ResolvedTenant(tenant)): Extension<ResolvedTenant>,
) -> ApiResult<UsageReport> {
    let report = state.quota.usage(&tenant).await?;
    Ok(ApiResponse::success(report))
}
