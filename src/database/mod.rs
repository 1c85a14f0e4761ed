pub mod manager;
pub mod memory;
pub mod models;
pub mod repository;

pub use manager::{ConnectionPoolManager, DatabaseError, PgPoolFactory, PoolFactory};
pub use memory::MemoryTenantStore;
pub use repository::{BootstrapAdmin, DirectoryError, PgTenantStore, TenantStore, TenantWriteTx};
