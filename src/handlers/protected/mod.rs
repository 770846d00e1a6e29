// handlers/protected/mod.rs - Protected handlers
//
// Every route here runs behind identity_middleware, which injects the caller's
// RequestContext. Device-level authorization happens in MessageService.
pub mod message; // Device message reads (/api/message/*)
