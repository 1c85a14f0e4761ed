// handlers/mod.rs - Handler tiers
//
// Public (no auth) → Protected (resolved, admitted tenant) → Elevated (root JWT)
pub mod elevated;
pub mod protected;
pub mod public;
