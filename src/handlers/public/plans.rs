// handlers/public/plans.rs - GET /plans handler

use crate::database::models::{catalogue, PlanSummary};
use crate::middleware::{ApiResponse, ApiResult};

/// Plan catalogue: prices, default limits and included features.
pub async fn plans() -> ApiResult<Vec<PlanSummary>> {
    Ok(ApiResponse::success(catalogue()))
}
