// handlers/elevated/tenant/update.rs - PUT /api/root/tenants/:id/{status,plan}

use axum::extract::{Extension, Json, Path, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::{Plan, Tenant, TenantStatus};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: TenantStatus,
}

#[derive(Debug, Deserialize)]
pub struct PlanChange {
    pub plan: Plan,
}

/// Lifecycle transition. Takes effect on the tenant's next request; a
/// backwards move answers 409.
pub async fn tenant_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(auth_user): Extension<AuthUser>,
    Json(change): Json<StatusChange>,
) -> ApiResult<Tenant> {
    let tenant = state.directory.set_status(id, change.status, &auth_user.actor()).await?;
    tracing::info!("Tenant {} set to {} by {}", id, tenant.status, auth_user.sub);
    Ok(ApiResponse::success(tenant))
}

/// Plan switch; limits reset to the new plan's defaults.
pub async fn tenant_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(auth_user): Extension<AuthUser>,
    Json(change): Json<PlanChange>,
) -> ApiResult<Tenant> {
    let tenant = state.directory.change_plan(id, change.plan, &auth_user.actor()).await?;
    tracing::info!("Tenant {} moved to plan {} by {}", id, tenant.plan, auth_user.sub);
    Ok(ApiResponse::success(tenant))
}
