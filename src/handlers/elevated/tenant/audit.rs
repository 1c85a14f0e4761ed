// handlers/elevated/tenant/audit.rs - GET /api/root/tenants/:id/audit handler

use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::AuditEntry;
use crate::middleware::{ApiResponse, ApiResult};

use super::load_404;

const MAX_ENTRIES: usize = 500;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Newest-first audit trail of a tenant, capped at 500 entries.
pub async fn audit_list(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Vec<AuditEntry>> {
    let tenant = load_404(&state, id).await?;
    let entries = state
        .directory
        .audit_log(tenant.id, query.limit.min(MAX_ENTRIES))
        .await?;
    Ok(ApiResponse::success(entries))
}
