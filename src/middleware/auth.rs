use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app::AppState;
use crate::auth::{Claims, TokenVerifier};
use crate::database::models::Actor;
use crate::error::ApiError;

use super::enforce_quota::client_ip;

/// Authenticated operator context extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub sub: String,
    pub access: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            sub: claims.sub,
            access: claims.access,
            ip: None,
            user_agent: None,
        }
    }
}

impl AuthUser {
    /// The operator as recorded in the audit trail.
    pub fn actor(&self) -> Actor {
        Actor::new(self.sub.clone()).with_origin(self.ip.clone(), self.user_agent.clone())
    }
}

/// Gate for tenant administration: a valid bearer token with root access.
pub async fn require_root(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match extract_bearer(&headers) {
        Ok(Some(token)) => token,
        Ok(None) => return ApiError::unauthorized("Missing Authorization header").into_response(),
        Err(msg) => return ApiError::unauthorized(msg).into_response(),
    };

    let claims = match state.verifier.verify(&token) {
        Ok(claims) => claims,
        Err(e) => return ApiError::unauthorized(e.to_string()).into_response(),
    };
    if !claims.is_root() {
        tracing::warn!("Root route refused for {} with access '{}'", claims.sub, claims.access);
        return ApiError::forbidden("Root access required").into_response();
    }

    let user = AuthUser {
        ip: client_ip(&request),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ..AuthUser::from(claims)
    };
    request.extensions_mut().insert(user);
    next.run(request).await
}

/// Bearer token from the Authorization header. `Ok(None)` when the header is absent.
pub fn extract_bearer(headers: &HeaderMap) -> Result<Option<String>, String> {
    let Some(auth_header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(Some(token.trim().to_string()))
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}
