// handlers/elevated/mod.rs - Elevated handlers (root JWT required)
//
// Route prefix: /api/root/*. The `require_root` route layer has already
// verified the bearer token and published the caller as `AuthUser`.

pub mod tenant;
