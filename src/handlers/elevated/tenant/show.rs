// handlers/elevated/tenant/show.rs - GET /api/root/tenants/:id handler

use axum::extract::{Path, State};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::Tenant;
use crate::middleware::{ApiResponse, ApiResult};

use super::load_404;

pub async fn tenant_show(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Tenant> {
    Ok(ApiResponse::success(load_404(&state, id).await?))
}
