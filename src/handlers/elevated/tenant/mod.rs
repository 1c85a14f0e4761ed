// handlers/elevated/tenant/mod.rs - Tenant administration

use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::Tenant;
use crate::error::ApiError;

pub mod audit;
pub mod create;
pub mod list;
pub mod show;
pub mod update;
pub mod usage;

pub use audit::audit_list; // GET /api/root/tenants/:id/audit
pub use create::tenant_create; // POST /api/root/tenants
pub use list::tenant_list; // GET /api/root/tenants
pub use show::tenant_show; // GET /api/root/tenants/:id
pub use update::{tenant_plan, tenant_status}; // PUT /api/root/tenants/:id/{status,plan}
pub use usage::{usage_reset, usage_show}; // GET|DELETE /api/root/tenants/:id/usage[/:metric]

/// Load a tenant by id or answer 404.
pub(crate) async fn load_404(state: &AppState, id: Uuid) -> Result<Tenant, ApiError> {
    state
        .directory
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Tenant {} not found", id)))
}
