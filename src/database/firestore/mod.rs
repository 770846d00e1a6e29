//! Firestore-backed message store, talking to the Firestore REST API.
//!
//! Every [`MessageQuery`] is rendered twice: once as a `runQuery` for the requested page and
//! once as a `runAggregationQuery` count over the same filter, so totals never depend on paging.

pub mod client;
pub mod query;
pub mod value;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use self::client::FirestoreClient;
use self::query::{parse_count, render_count_query, render_run_query, QueryTarget};
use self::value::decode_fields;
use super::models::{fields, AggregatedData, Message, StoredMessage};
use super::{
    AggregationStore, ClientScope, MessageBackend, MessageStore, StoreError, StoreResult, AGGREGATIONS_COLLECTION,
    MESSAGES_COLLECTION,
};
use crate::config::FirestoreConfig;
use crate::filter::{
    FilterCondition, FilterField, FilterOp, FilterValue, IdFormat, MessageId, MessageQuery, PageResult, SortDirection,
    SortSpec,
};

pub struct FirestoreMessageStore {
    client: FirestoreClient,
}

impl FirestoreMessageStore {
    pub async fn connect(config: &FirestoreConfig, timeout: Duration) -> StoreResult<Self> {
        let client = FirestoreClient::connect(config, timeout).await?;
        tracing::info!("Using Firestore database {}", client.documents_root());
        Ok(Self { client })
    }

    async fn query_messages(
        &self,
        conditions: &[FilterCondition],
        sort: &SortSpec,
        skip: u64,
        limit: u64,
    ) -> StoreResult<Vec<Message>> {
        let collection_path = self.client.collection_path(MESSAGES_COLLECTION);
        let target = QueryTarget {
            collection_id: MESSAGES_COLLECTION,
            collection_path: &collection_path,
        };
        let body = render_run_query(conditions, sort, skip, limit, &target)?;
        let documents = self.client.run_query(&body).await?;
        documents.iter().map(decode_message).collect()
    }

    async fn count_messages(&self, conditions: &[FilterCondition], sort: &SortSpec) -> StoreResult<u64> {
        let collection_path = self.client.collection_path(MESSAGES_COLLECTION);
        let target = QueryTarget {
            collection_id: MESSAGES_COLLECTION,
            collection_path: &collection_path,
        };
        let body = render_count_query(conditions, sort, &target)?;
        parse_count(&self.client.run_aggregation_query(&body).await?)
    }
}

fn newest_first() -> SortSpec {
    SortSpec {
        field: FilterField::Path(fields::TIMESTAMP.to_string()),
        direction: SortDirection::Desc,
    }
}

fn scope_condition(scope: ClientScope<'_>) -> FilterCondition {
    FilterCondition::one_of(fields::CLIENT_ID, scope.0.iter().cloned())
}

/// Last segment of a document resource name
fn document_id(document: &Value) -> StoreResult<&str> {
    document
        .get("name")
        .and_then(Value::as_str)
        .and_then(|name| name.rsplit('/').next())
        .ok_or_else(|| StoreError::DecodeError("document without a name".to_string()))
}

pub fn decode_message(document: &Value) -> StoreResult<Message> {
    let id = document_id(document)?;
    let mut plain = decode_fields(document.get("fields"));
    // Documents written without audit fields fall back to the server timestamps
    if let Value::Object(map) = &mut plain {
        for (field, server_field) in [(fields::CREATED_AT, "createTime"), (fields::UPDATED_AT, "updateTime")] {
            if !map.contains_key(field) {
                if let Some(server_time) = document.get(server_field) {
                    map.insert(field.to_string(), server_time.clone());
                }
            }
        }
    }
    let stored: StoredMessage = serde_json::from_value(plain)
        .map_err(|e| StoreError::DecodeError(format!("message {}: {}", id, e)))?;
    Ok(stored.into_message(id))
}

fn decode_aggregation(document: &Value) -> StoreResult<AggregatedData> {
    serde_json::from_value(decode_fields(document.get("fields")))
        .map_err(|e| StoreError::DecodeError(format!("aggregation {}: {}", document_id(document).unwrap_or("?"), e)))
}

#[async_trait]
impl MessageStore for FirestoreMessageStore {
    async fn find_by_id(&self, id: &MessageId) -> StoreResult<Message> {
        match self.client.get_document(MESSAGES_COLLECTION, id.as_str()).await? {
            Some(document) => decode_message(&document),
            None => Err(StoreError::NotFound(format!("message {} not found", id))),
        }
    }

    async fn list(&self, query: &MessageQuery) -> StoreResult<PageResult<Message>> {
        let (items, total) = tokio::try_join!(
            self.query_messages(&query.conditions, &query.sort, query.page.skip, query.page.limit),
            self.count_messages(&query.conditions, &query.sort),
        )?;
        Ok(PageResult { items, total })
    }

    async fn find_by_topic(&self, topic: &str, scope: ClientScope<'_>, limit: u64) -> StoreResult<Vec<Message>> {
        let conditions = [
            FilterCondition::eq(fields::TOPIC, FilterValue::String(topic.to_string())),
            scope_condition(scope),
        ];
        self.query_messages(&conditions, &newest_first(), 0, limit).await
    }

    async fn find_by_client_id(&self, client_id: &str, limit: u64) -> StoreResult<Vec<Message>> {
        let conditions = [FilterCondition::eq(fields::CLIENT_ID, FilterValue::String(client_id.to_string()))];
        self.query_messages(&conditions, &newest_first(), 0, limit).await
    }

    async fn find_by_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        scope: ClientScope<'_>,
        limit: u64,
    ) -> StoreResult<Vec<Message>> {
        let bound = |op, at| FilterCondition {
            field: FilterField::Path(fields::TIMESTAMP.to_string()),
            op,
            value: FilterValue::Time(at),
        };
        let conditions = [bound(FilterOp::Gte, from), bound(FilterOp::Lte, to), scope_condition(scope)];
        self.query_messages(&conditions, &newest_first(), 0, limit).await
    }
}

#[async_trait]
impl AggregationStore for FirestoreMessageStore {
    async fn aggregations_for_client(&self, client_id: &str, period: Option<&str>) -> StoreResult<Vec<AggregatedData>> {
        let mut conditions = vec![FilterCondition::eq(fields::CLIENT_ID, FilterValue::String(client_id.to_string()))];
        if let Some(period) = period {
            conditions.push(FilterCondition::eq("period", FilterValue::String(period.to_string())));
        }
        let collection_path = self.client.collection_path(AGGREGATIONS_COLLECTION);
        let target = QueryTarget {
            collection_id: AGGREGATIONS_COLLECTION,
            collection_path: &collection_path,
        };
        let sort = SortSpec {
            field: FilterField::Path(fields::TIMESTAMP.to_string()),
            direction: SortDirection::Asc,
        };
        // Aggregation buckets are bounded per client; fetch them all in one page
        let body = render_run_query(&conditions, &sort, 0, 10_000, &target)?;
        let documents = self.client.run_query(&body).await?;
        documents.iter().map(decode_aggregation).collect()
    }
}

#[async_trait]
impl MessageBackend for FirestoreMessageStore {
    fn backend_name(&self) -> &'static str {
        "firestore"
    }

    fn id_format(&self) -> IdFormat {
        IdFormat::DocumentKey
    }

    async fn health_check(&self) -> StoreResult<()> {
        let collection_path = self.client.collection_path(MESSAGES_COLLECTION);
        let target = QueryTarget {
            collection_id: MESSAGES_COLLECTION,
            collection_path: &collection_path,
        };
        let body = render_run_query(&[], &newest_first(), 0, 1, &target)?;
        self.client.run_query(&body).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{MessageStatus, MessageType};
    use serde_json::json;

    #[test]
    fn decodes_document_with_server_timestamps() {
        let document = json!({
            "name": "projects/demo/databases/(default)/documents/messages/Xy7Q2abc",
            "fields": {
                "topic": {"stringValue": "plant/4/command"},
                "payload": {"stringValue": "reboot"},
                "client_id": {"stringValue": "dev-4"},
                "timestamp": {"timestampValue": "2024-05-01T10:00:00.250Z"},
                "metadata": {"mapValue": {"fields": {"qos": {"stringValue": "1"}}}}
            },
            "createTime": "2024-05-01T10:00:01Z",
            "updateTime": "2024-05-01T10:00:02Z"
        });

        let message = decode_message(&document).unwrap();
        assert_eq!(message.id, "Xy7Q2abc");
        assert_eq!(message.message_type, MessageType::Command);
        assert_eq!(message.status, MessageStatus::Received);
        assert_eq!(message.timestamp.timestamp_millis() % 1000, 250);
        assert_eq!(message.created_at.to_rfc3339(), "2024-05-01T10:00:01+00:00");
        assert_eq!(message.updated_at.to_rfc3339(), "2024-05-01T10:00:02+00:00");
        assert_eq!(message.metadata.get("qos").map(String::as_str), Some("1"));
    }

    #[test]
    fn document_without_name_is_a_decode_error() {
        assert!(matches!(decode_message(&json!({"fields": {}})), Err(StoreError::DecodeError(_))));
    }

    #[test]
    fn decodes_aggregation_bucket() {
        let document = json!({
            "name": "projects/demo/databases/(default)/documents/aggregations/a1",
            "fields": {
                "client_id": {"stringValue": "dev-1"},
                "channel": {"stringValue": "ch1"},
                "variable": {"stringValue": "temp"},
                "period": {"stringValue": "hour"},
                "timestamp": {"timestampValue": "2024-03-01T01:00:00Z"},
                "sum": {"doubleValue": 10.0},
                "count": {"integerValue": "2"},
                "min": {"integerValue": "4"},
                "max": {"doubleValue": 6.0},
                "avg": {"doubleValue": 5.0}
            }
        });
        let bucket = decode_aggregation(&document).unwrap();
        assert_eq!(bucket.count, 2);
        assert_eq!(bucket.min, 4.0);
        assert_eq!(bucket.period, "hour");
    }
}
