use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;

use crate::app::AppState;
use crate::database::models::Tenant;
use crate::error::ApiError;
use crate::services::resolver::TenantHints;

use super::auth::extract_bearer;

pub const TENANT_ID_HEADER: &str = "x-tenant-id";

/// The tenant a request was resolved to. Handlers read it, they never
/// re-resolve.
#[derive(Clone, Debug)]
pub struct ResolvedTenant(pub Arc<Tenant>);

/// Data-layer handle for the resolved tenant, shared or dedicated
#[derive(Clone)]
pub struct TenantPool(pub PgPool);

fn hints_from(headers: &HeaderMap, request: &Request) -> TenantHints {
    let tenant_header = headers
        .get(TENANT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()));
    // A malformed Authorization header simply contributes no claim here.
    let bearer = extract_bearer(headers).ok().flatten();

    TenantHints { tenant_header, host, bearer }
}

/// Resolves the tenant, rejects suspended/unknown ones, and publishes the
/// tenant and its pool into request extensions.
pub async fn resolve_tenant_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let hints = hints_from(&headers, &request);

    let tenant = match state.resolver.resolve(&hints).await {
        Ok(tenant) => tenant,
        Err(e) => {
            tracing::debug!("Tenant resolution failed: {}", e);
            return ApiError::from(e).into_response();
        }
    };

    let pool = match state.pools.get_connection(&tenant).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to get pool for tenant {}: {}", tenant.id, e);
            return ApiError::from(e).into_response();
        }
    };

    let tenant_id = tenant.id;
    request.extensions_mut().insert(ResolvedTenant(Arc::new(tenant)));
    request.extensions_mut().insert(TenantPool(pool));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&tenant_id.to_string()) {
        response.headers_mut().insert(TENANT_ID_HEADER, value);
    }
    response
}
