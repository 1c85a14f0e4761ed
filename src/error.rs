// HTTP API Error Types
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::time::Duration;

use crate::database::manager::DatabaseError;
use crate::database::repository::DirectoryError;
use crate::services::quota_service::{Denial, DenyReason};
use crate::services::resolver::ResolveError;
use crate::store::StoreError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 402 Payment Required (plan quota exhausted)
    PaymentRequired {
        metric: String,
        current: i64,
        limit: i64,
        upgrade_url: Option<String>,
    },

    // 403 Forbidden
    Forbidden(String),
    TenantSuspended(String),

    // 404 Not Found
    NotFound(String),
    TenantNotFound(String),

    // 409 Conflict
    Conflict(String),

    // 429 Too Many Requests
    TooManyRequests {
        message: String,
        retry_after: Option<Duration>,
    },

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::PaymentRequired { .. } => 402,
            ApiError::Forbidden(_) => 403,
            ApiError::TenantSuspended(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::TenantNotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::TooManyRequests { .. } => 429,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::TenantSuspended(msg)
            | ApiError::NotFound(msg)
            | ApiError::TenantNotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::InternalServerError(msg)
            | ApiError::ServiceUnavailable(msg) => msg.clone(),
            ApiError::TooManyRequests { message, .. } => message.clone(),
            ApiError::PaymentRequired { metric, current, limit, .. } => format!(
                "Plan limit reached for {} ({}/{}). Upgrade your plan to continue.",
                metric, current, limit
            ),
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut response = json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        });

        match self {
            ApiError::PaymentRequired { metric, current, limit, upgrade_url } => {
                response["metric"] = json!(metric);
                response["current"] = json!(current);
                response["limit"] = json!(limit);
                response["upgrade_url"] = json!(upgrade_url);
            }
            ApiError::TooManyRequests { retry_after: Some(wait), .. } => {
                response["retry_after"] = json!(retry_after_secs(*wait));
            }
            _ => {}
        }

        response
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::PaymentRequired { .. } => "QUOTA_EXCEEDED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::TenantSuspended(_) => "TENANT_SUSPENDED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::TenantNotFound(_) => "TENANT_NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::TooManyRequests { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Whole seconds, rounded up so clients never retry early.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs();
    if wait.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotIdentified => ApiError::TenantNotFound("Tenant not found".to_string()),
            ResolveError::Suspended(_) => {
                ApiError::TenantSuspended("Tenant account is suspended".to_string())
            }
            ResolveError::Unavailable(msg) => {
                tracing::error!("Tenant resolution unavailable: {}", msg);
                ApiError::service_unavailable("Tenant directory temporarily unavailable")
            }
        }
    }
}

impl From<Denial> for ApiError {
    fn from(denial: Denial) -> Self {
        match denial.reason {
            DenyReason::PlanLimit => ApiError::PaymentRequired {
                metric: denial.metric,
                current: denial.current,
                limit: denial.limit,
                upgrade_url: denial.upgrade_url,
            },
            DenyReason::RateLimit => ApiError::TooManyRequests {
                message: format!(
                    "Rate limit of {} requests exceeded, retry later",
                    denial.limit
                ),
                retry_after: denial.retry_after,
            },
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::InvalidInput(msg) => ApiError::bad_request(msg),
            DirectoryError::InvalidTransition { .. } => ApiError::conflict(err.to_string()),
            DirectoryError::SubdomainTaken(_) | DirectoryError::DomainTaken(_) | DirectoryError::Busy(_) => {
                ApiError::conflict(err.to_string())
            }
            DirectoryError::NotFound(id) => ApiError::not_found(format!("Tenant {} not found", id)),
            DirectoryError::Unavailable(msg) => {
                tracing::error!("Tenant directory unavailable: {}", msg);
                ApiError::service_unavailable("Tenant directory temporarily unavailable")
            }
            DirectoryError::WriteFailed(msg) => {
                // Don't expose internal SQL errors to clients
                tracing::error!("Tenant write failed: {}", msg);
                ApiError::internal_server_error("Tenant creation failed; no changes were made")
            }
            DirectoryError::Corrupt { id, reason } => {
                tracing::error!("Corrupt tenant record {}: {}", id, reason);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!("Counter store error: {}", err);
        ApiError::service_unavailable("Usage tracking temporarily unavailable")
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        // Log the real error but return generic message
        tracing::error!("Database error: {}", err);
        ApiError::service_unavailable("Database temporarily unavailable")
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.to_json())).into_response();
        if let ApiError::TooManyRequests { retry_after: Some(wait), .. } = &self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(*wait)));
        }
        response
    }
}
