use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app::AppState;
use crate::database::models::Metric;
use crate::error::ApiError;
use crate::services::quota_service::QuotaDecision;

use super::resolve_tenant::ResolvedTenant;

/// Metrics a request to `path` consumes.
pub fn metrics_for_path(path: &str) -> Vec<Metric> {
    let mut metrics = vec![Metric::ApiCalls];
    if under(path, "/api/agents") {
        metrics.push(Metric::McpAgents);
    }
    if under(path, "/api/chat") || under(path, "/api/whatsapp") {
        metrics.push(Metric::WhatsappMessages);
    }
    metrics
}

fn under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Client address: first X-Forwarded-For hop, then X-Real-IP, then the
/// socket peer.
pub fn client_ip(request: &Request) -> Option<String> {
    let headers = request.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}

/// Throttling key of the client; requests with no known address share one.
pub fn client_key(request: &Request) -> String {
    client_ip(request).unwrap_or_else(|| "unknown".to_string())
}

/// Runs after resolution: rate limit first, then plan quota with optimistic
/// pre-increment.
pub async fn enforce_quota_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ResolvedTenant(tenant)) = request.extensions().get::<ResolvedTenant>().cloned() else {
        tracing::error!("Quota enforcement reached without a resolved tenant");
        return ApiError::internal_server_error("Tenant context missing").into_response();
    };

    let client = client_key(&request);
    match state.quota.check_rate(&tenant, &client).await {
        Ok(QuotaDecision::Allow) => {}
        Ok(QuotaDecision::Deny(denial)) => return ApiError::from(denial).into_response(),
        Err(e) => return ApiError::from(e).into_response(),
    }

    let metrics = metrics_for_path(request.uri().path());
    match state.quota.admit(&tenant, &metrics).await {
        Ok(QuotaDecision::Allow) => next.run(request).await,
        Ok(QuotaDecision::Deny(denial)) => ApiError::from(denial).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
