// handlers/mod.rs - Handler tiers
//
// Public (no auth) → Protected (bearer token verified by the identity provider)
pub mod protected; // Requires Authorization: Bearer (/api/*)
pub mod public; // No authentication (/health)
