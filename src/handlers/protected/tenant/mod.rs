// handlers/protected/tenant/mod.rs - The calling tenant's own view

pub mod features;
pub mod limits;
pub mod show;
pub mod usage;

pub use features::features_show; // GET /api/tenant/features
pub use limits::limit_check; // GET /api/tenant/limits/:metric
pub use show::tenant_show; // GET /api/tenant
pub use usage::usage_show; // GET /api/tenant/usage
