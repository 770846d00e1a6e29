pub mod collection;
pub mod device;
pub mod record;
pub mod search;

// Re-export handler functions for use in routing
pub use collection::get as collection_get;
pub use record::get as record_get;

pub use device::aggregations as aggregations_get;
pub use device::get as device_get;
pub use device::latest as device_latest_get;

pub use search::topic as topic_get;
pub use search::window as window_get;

use serde::Deserialize;

use crate::services::ListParams;

/// `?filter=&range=&sort=`, each a JSON-encoded string
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub range: Option<String>,
    pub sort: Option<String>,
}

impl From<ListQuery> for ListParams {
    fn from(query: ListQuery) -> Self {
        ListParams {
            filter: query.filter,
            range: query.range,
            sort: query.sort,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u64>,
}
