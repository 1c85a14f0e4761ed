// handlers/public/mod.rs - Public handlers (no authentication, no tenant)

pub mod health;
pub mod home;
pub mod plans;

pub use health::health;
pub use home::home;
pub use plans::plans;
