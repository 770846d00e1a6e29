pub mod access;
pub mod message_service;

pub use access::{AccessError, AccessGrant, AccessResolver, HttpAccessResolver, PermittedSet};
pub use message_service::{ListParams, MessagePage, MessageService, ServiceError};
