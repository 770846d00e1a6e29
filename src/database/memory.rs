//! In-memory implementation of the message store.
//!
//! # Purpose
//! Evaluates a [`MessageQuery`] directly against messages held in a `Vec`, with the same
//! semantics the MongoDB and Firestore renderers target. It serves as:
//! - the reference implementation the store renderers are checked against in tests
//! - the backend of the HTTP integration tests (no external services needed)
//!
//! It is the only store with a write path ([`MemoryMessageStore::insert`]); it is not
//! selectable through `DATABASE_PROVIDER`.
//!
//! Each record keeps the document as persisted next to its decoded [`Message`]. Conditions
//! and sorting see the persisted document, so a record stored without `type` or `status`
//! does not match a filter on them even though reads fill both in. MongoDB and Firestore
//! behave the same way.
//!
//! # Consistency
//! State lives behind a `tokio::sync::RwLock`; reads are concurrent, inserts serialize.
//! Nothing is durable.
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use super::models::{fields, AggregatedData, Message, MessageStatus, MessageType, NewMessage, StoredMessage};
use super::{AggregationStore, ClientScope, MessageBackend, MessageStore, StoreError, StoreResult};
use crate::filter::{
    FilterCondition, FilterField, FilterOp, FilterValue, IdFormat, MessageId, MessageQuery, PageResult, SortDirection,
    SortSpec,
};

struct Record {
    message: Message,
    document: Value,
}

pub struct MemoryMessageStore {
    id_format: IdFormat,
    next_id: AtomicU64,
    messages: RwLock<Vec<Record>>,
    aggregations: RwLock<Vec<AggregatedData>>,
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new(IdFormat::ObjectId)
    }
}

impl MemoryMessageStore {
    pub fn new(id_format: IdFormat) -> Self {
        Self {
            id_format,
            next_id: AtomicU64::new(1),
            messages: RwLock::new(Vec::new()),
            aggregations: RwLock::new(Vec::new()),
        }
    }

    /// Stores a message the way the ingestion pipeline would: assigns an id, sets the audit
    /// timestamps, derives the type from the topic and marks it received.
    pub async fn insert(&self, new: NewMessage) -> Message {
        let now = Utc::now();
        let id = self.next_id();
        let message = Message {
            id,
            message_type: MessageType::from_topic(&new.topic),
            status: MessageStatus::Received,
            timestamp: new.timestamp.unwrap_or(now),
            created_at: now,
            updated_at: now,
            processed_at: None,
            created_by: new.created_by,
            metadata: new.metadata,
            topic: new.topic,
            payload: new.payload,
            parsed_payload: new.parsed_payload,
            client_id: new.client_id,
        };
        let document = serde_json::to_value(&message).unwrap_or(Value::Null);
        self.messages.write().await.push(Record {
            message: message.clone(),
            document,
        });
        message
    }

    /// Stores a raw document as another writer might have left it, e.g. without `type` or
    /// `status`. Returns the message as reads will decode it.
    pub async fn insert_document(&self, document: Value) -> StoreResult<Message> {
        let stored: StoredMessage =
            serde_json::from_value(document.clone()).map_err(|e| StoreError::DecodeError(e.to_string()))?;
        let message = stored.into_message(self.next_id());
        self.messages.write().await.push(Record {
            message: message.clone(),
            document,
        });
        Ok(message)
    }

    // 24 hex digits satisfy both identifier formats
    fn next_id(&self) -> String {
        format!("{:024x}", self.next_id.fetch_add(1, AtomicOrdering::Relaxed))
    }

    pub async fn insert_aggregation(&self, bucket: AggregatedData) {
        self.aggregations.write().await.push(bucket);
    }

    async fn select<F>(&self, predicate: F, sort: &SortSpec) -> Vec<Message>
    where
        F: Fn(&Message, &Value) -> bool,
    {
        let messages = self.messages.read().await;
        let mut selected: Vec<(Message, Value)> = messages
            .iter()
            .filter(|r| predicate(&r.message, &r.document))
            .map(|r| (r.message.clone(), r.document.clone()))
            .collect();

        selected.sort_by(|(a, a_doc), (b, b_doc)| {
            let ordering = match &sort.field {
                FilterField::Id => a.id.cmp(&b.id),
                FilterField::Path(path) => compare_sort_keys(lookup(a_doc, path), lookup(b_doc, path), fields::is_time_field(path)),
            };
            let ordering = match sort.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            ordering.then_with(|| a.id.cmp(&b.id))
        });

        selected.into_iter().map(|(m, _)| m).collect()
    }

    fn newest_first() -> SortSpec {
        SortSpec {
            field: FilterField::Path(fields::TIMESTAMP.to_string()),
            direction: SortDirection::Desc,
        }
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn find_by_id(&self, id: &MessageId) -> StoreResult<Message> {
        self.messages
            .read()
            .await
            .iter()
            .find(|r| r.message.id == id.as_str())
            .map(|r| r.message.clone())
            .ok_or_else(|| StoreError::NotFound("message not found".to_string()))
    }

    async fn list(&self, query: &MessageQuery) -> StoreResult<PageResult<Message>> {
        let matched = self
            .select(|m, doc| query.conditions.iter().all(|c| matches_condition(m, doc, c)), &query.sort)
            .await;
        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(query.page.skip as usize)
            .take(query.page.limit as usize)
            .collect();
        Ok(PageResult { items, total })
    }

    async fn find_by_topic(&self, topic: &str, scope: ClientScope<'_>, limit: u64) -> StoreResult<Vec<Message>> {
        let mut found = self
            .select(|m, _| m.topic == topic && scope.contains(&m.client_id), &Self::newest_first())
            .await;
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn find_by_client_id(&self, client_id: &str, limit: u64) -> StoreResult<Vec<Message>> {
        let mut found = self.select(|m, _| m.client_id == client_id, &Self::newest_first()).await;
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn find_by_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        scope: ClientScope<'_>,
        limit: u64,
    ) -> StoreResult<Vec<Message>> {
        let mut found = self
            .select(
                |m, _| m.timestamp >= from && m.timestamp <= to && scope.contains(&m.client_id),
                &Self::newest_first(),
            )
            .await;
        found.truncate(limit as usize);
        Ok(found)
    }
}

#[async_trait]
impl AggregationStore for MemoryMessageStore {
    async fn aggregations_for_client(&self, client_id: &str, period: Option<&str>) -> StoreResult<Vec<AggregatedData>> {
        let mut buckets: Vec<AggregatedData> = self
            .aggregations
            .read()
            .await
            .iter()
            .filter(|b| b.client_id == client_id && period.map_or(true, |p| b.period == p))
            .cloned()
            .collect();
        buckets.sort_by_key(|b| b.timestamp);
        Ok(buckets)
    }
}

#[async_trait]
impl MessageBackend for MemoryMessageStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn id_format(&self) -> IdFormat {
        self.id_format
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| current.get(segment))
}

fn matches_condition(message: &Message, doc: &Value, condition: &FilterCondition) -> bool {
    if condition.field == FilterField::Id {
        return match (&condition.op, &condition.value) {
            (FilterOp::Eq, FilterValue::Id(id)) => message.id == id.as_str(),
            (FilterOp::Ne, FilterValue::Id(id)) => message.id != id.as_str(),
            _ => false,
        };
    }
    let FilterField::Path(path) = &condition.field else {
        return false;
    };
    let actual = lookup(doc, path);

    match condition.op {
        FilterOp::Eq => equals(actual, &condition.value),
        FilterOp::Ne => !equals(actual, &condition.value),
        FilterOp::Gt => compare(actual, &condition.value) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(compare(actual, &condition.value), Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => compare(actual, &condition.value) == Some(Ordering::Less),
        FilterOp::Lte => matches!(compare(actual, &condition.value), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::In => list_items(&condition.value).iter().any(|v| equals(actual, v)),
        FilterOp::NIn => !list_items(&condition.value).iter().any(|v| equals(actual, v)),
    }
}

fn list_items(value: &FilterValue) -> &[FilterValue] {
    match value {
        FilterValue::List(items) => items,
        _ => &[],
    }
}

fn equals(actual: Option<&Value>, expected: &FilterValue) -> bool {
    match (actual, expected) {
        (None | Some(Value::Null), FilterValue::Null) => true,
        (Some(Value::Array(items)), FilterValue::List(expected)) => {
            items.len() == expected.len() && items.iter().zip(expected).all(|(a, e)| equals(Some(a), e))
        }
        (Some(Value::Object(map)), FilterValue::Map(expected)) => map == expected,
        _ => compare(actual, expected) == Some(Ordering::Equal),
    }
}

/// Ordering between a stored value and an operand of the same type; `None` when the types differ.
fn compare(actual: Option<&Value>, expected: &FilterValue) -> Option<Ordering> {
    let actual = actual?;
    match (actual, expected) {
        (Value::Bool(a), FilterValue::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), FilterValue::Int(b)) => a.as_f64()?.partial_cmp(&(*b as f64)),
        (Value::Number(a), FilterValue::Float(b)) => a.as_f64()?.partial_cmp(b),
        (Value::String(a), FilterValue::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::String(a), FilterValue::Time(b)) => {
            let a = DateTime::parse_from_rfc3339(a).ok()?.with_timezone(&Utc);
            Some(a.cmp(b))
        }
        _ => None,
    }
}

/// Missing and null values sort before everything else, as in MongoDB.
fn compare_sort_keys(a: Option<&Value>, b: Option<&Value>, time_field: bool) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) if time_field => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
