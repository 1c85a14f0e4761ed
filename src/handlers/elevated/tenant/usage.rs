// handlers/elevated/tenant/usage.rs - GET|DELETE /api/root/tenants/:id/usage[/:metric]

use axum::extract::{Extension, Path, State};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::{AuditAction, Metric, UsageReport};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

use super::load_404;

pub async fn usage_show(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<UsageReport> {
    let tenant = load_404(&state, id).await?;
    Ok(ApiResponse::success(state.quota.usage(&tenant).await?))
}

/// Clear the current-period counter of one metric.
pub async fn usage_reset(
    State(state): State<AppState>,
    Path((id, metric)): Path<(Uuid, String)>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Value> {
    let metric: Metric = metric.parse().map_err(ApiError::bad_request)?;
    let tenant = load_404(&state, id).await?;
    state.quota.reset(&tenant, &metric).await?;
    state
        .directory
        .audit(id, &auth_user.actor(), AuditAction::UsageReset, json!({ "metric": metric }))
        .await;
    Ok(ApiResponse::success(json!({ "tenant_id": id, "metric": metric, "reset": true })))
}
