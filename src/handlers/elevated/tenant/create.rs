// handlers/elevated/tenant/create.rs - POST /api/root/tenants handler

use axum::extract::{Extension, Json, State};

use crate::app::AppState;
use crate::database::models::Tenant;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::CreateTenantInput;

/// Onboard a tenant.
///
/// Expected input:
/// ```json
/// {
///   "subdomain": "acme",
///   "display_name": "Acme Corp",
///   "owner_email": "owner@acme.test",
///   "plan": "starter",
///   "isolation_level": "shared",
///   "custom_domain": "app.acme.test",
///   "limit_overrides": { "max_users": 25 },
///   "features": { "api_access": true }
/// }
/// ```
///
/// Answers 201 with the tenant, 400 on invalid input, 409 when the subdomain
/// or domain is taken or another onboarding for it is in flight.
pub async fn tenant_create(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(input): Json<CreateTenantInput>,
) -> ApiResult<Tenant> {
    let tenant = state.directory.create(input, &auth_user.actor()).await?;
    tracing::info!("Tenant {} onboarded by {}", tenant.id, auth_user.sub);
    Ok(ApiResponse::created(tenant))
}
