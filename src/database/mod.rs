use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::filter::{IdFormat, MessageId, MessageQuery, PageResult};

pub mod firestore;
pub mod manager;
pub mod memory;
pub mod models;
pub mod mongo;

pub use manager::{DatabaseManager, DatabaseProvider};
pub use models::{AggregatedData, ClientAggregations, Message};

pub const MESSAGES_COLLECTION: &str = "messages";
pub const AGGREGATIONS_COLLECTION: &str = "aggregations";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Client identifiers a convenience query may return messages for
#[derive(Debug, Clone, Copy)]
pub struct ClientScope<'a>(pub &'a [String]);

impl ClientScope<'_> {
    pub fn contains(&self, client_id: &str) -> bool {
        self.0.iter().any(|c| c == client_id)
    }
}

/// Read access to device messages. One implementation per backing store.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn find_by_id(&self, id: &MessageId) -> StoreResult<Message>;

    /// Total is the count of all documents matching the query conditions, independent of the page.
    async fn list(&self, query: &MessageQuery) -> StoreResult<PageResult<Message>>;

    async fn find_by_topic(&self, topic: &str, scope: ClientScope<'_>, limit: u64) -> StoreResult<Vec<Message>>;

    async fn find_by_client_id(&self, client_id: &str, limit: u64) -> StoreResult<Vec<Message>>;

    async fn find_by_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        scope: ClientScope<'_>,
        limit: u64,
    ) -> StoreResult<Vec<Message>>;
}

/// Pre-computed statistics written by the ingestion pipeline
#[async_trait]
pub trait AggregationStore: Send + Sync {
    async fn aggregations_for_client(&self, client_id: &str, period: Option<&str>) -> StoreResult<Vec<AggregatedData>>;
}

/// Everything the API needs from the configured provider.
#[async_trait]
pub trait MessageBackend: MessageStore + AggregationStore {
    fn backend_name(&self) -> &'static str;
    fn id_format(&self) -> IdFormat;
    async fn health_check(&self) -> StoreResult<()>;
}
