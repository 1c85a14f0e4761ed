// handlers/protected/mod.rs - Tenant-scoped handlers
//
// Every route here runs behind tenant resolution and quota enforcement, so
// handlers read the admitted tenant from the `ResolvedTenant` extension.

pub mod tenant;
