pub mod auth;
pub mod enforce_quota;
pub mod resolve_tenant;
pub mod response;

pub use auth::{require_root, AuthUser};
pub use enforce_quota::enforce_quota_middleware;
pub use resolve_tenant::{resolve_tenant_middleware, ResolvedTenant, TenantPool, TENANT_ID_HEADER};
pub use response::{ApiResponse, ApiResult};
