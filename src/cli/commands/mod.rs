pub mod plans;
pub mod tenant;
pub mod token;
pub mod usage;
