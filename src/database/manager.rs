use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::firestore::FirestoreMessageStore;
use super::mongo::MongoMessageStore;
use super::{MessageBackend, StoreResult};
use crate::config::{ConfigError, DatabaseConfig};

/// Document store selected once at startup through `DATABASE_PROVIDER`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseProvider {
    Mongo,
    Firestore,
}

impl FromStr for DatabaseProvider {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(DatabaseProvider::Mongo),
            "firestore" => Ok(DatabaseProvider::Firestore),
            _ => Err(ConfigError::InvalidProvider(raw.to_string())),
        }
    }
}

impl std::fmt::Display for DatabaseProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseProvider::Mongo => f.write_str("mongodb"),
            DatabaseProvider::Firestore => f.write_str("firestore"),
        }
    }
}

/// Builds the message backend for the configured provider. There is no fallback:
/// a provider that cannot be reached fails startup.
pub struct DatabaseManager;

impl DatabaseManager {
    pub async fn connect(
        provider: DatabaseProvider,
        config: &DatabaseConfig,
        timeout: Duration,
    ) -> StoreResult<Arc<dyn MessageBackend>> {
        info!("Connecting to {} message store", provider);
        Ok(match provider {
            DatabaseProvider::Mongo => Arc::new(MongoMessageStore::connect(&config.uri, &config.name, timeout).await?),
            DatabaseProvider::Firestore => Arc::new(FirestoreMessageStore::connect(&config.firestore, timeout).await?),
        })
    }
}
