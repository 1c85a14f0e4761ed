// handlers/elevated/tenant/list.rs - GET /api/root/tenants handler

use axum::extract::State;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::TenantSummary;

pub async fn tenant_list(State(state): State<AppState>) -> ApiResult<Vec<TenantSummary>> {
    let tenants = state.directory.list().await?;
    Ok(ApiResponse::success(tenants.iter().map(TenantSummary::from).collect()))
}
