// handlers/protected/tenant/show.rs - GET /api/tenant handler

use axum::extract::Extension;

use crate::database::models::Tenant;
use crate::middleware::{ApiResponse, ApiResult, ResolvedTenant};

pub async fn tenant_show(Extension(ResolvedTenant(tenant)): Extension<ResolvedTenant>) -> ApiResult<Tenant> {
    Ok(ApiResponse::success(tenant.as_ref().clone()))
}
