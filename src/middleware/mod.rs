pub mod auth;
pub mod extract;
pub mod response;

pub use auth::{identity_middleware, RequestContext};
pub use extract::{ApiPath, ApiQuery};
pub use response::{ApiResult, ListResponse};
