// handlers/public/home.rs - GET / handler

use axum::response::Json;
use serde_json::{json, Value};

pub async fn home() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Tenancy API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "health": "/health (public)",
                "plans": "/plans (public)",
                "tenant": "/api/tenant[/features|/usage|/limits/:metric] (tenant-scoped)",
                "root": "/api/root/tenants[/:id[/status|/plan|/usage]] (root token)",
            },
            "tenant_identification": [
                "X-Tenant-ID header",
                "subdomain of the Host header",
                "custom domain",
                "tenant_id claim of the bearer token",
            ]
        }
    }))
}
