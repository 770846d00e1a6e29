use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use mongodb::options::{ClientOptions, CountOptions, FindOptions};
use mongodb::{Client, Collection, Database};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::models::{fields, AggregatedData, Message, StoredMessage};
use super::{
    AggregationStore, ClientScope, MessageBackend, MessageStore, StoreError, StoreResult, AGGREGATIONS_COLLECTION,
    MESSAGES_COLLECTION,
};
use crate::filter::{
    FilterCondition, FilterField, FilterOp, FilterValue, IdFormat, MessageId, MessageQuery, PageResult, SortDirection,
    SortSpec,
};

/// A message as persisted by the ingestion service
#[derive(Debug, Deserialize)]
pub struct MessageDocument {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub parsed_payload: Option<Bson>,
    #[serde(default)]
    pub client_id: String,
    #[serde(default, rename = "type")]
    pub message_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<bson::DateTime>,
    #[serde(default)]
    pub created_at: Option<bson::DateTime>,
    #[serde(default)]
    pub updated_at: Option<bson::DateTime>,
    #[serde(default)]
    pub processed_at: Option<bson::DateTime>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl From<MessageDocument> for Message {
    fn from(doc: MessageDocument) -> Self {
        StoredMessage {
            topic: doc.topic,
            payload: doc.payload,
            parsed_payload: doc.parsed_payload.map(Bson::into_relaxed_extjson),
            client_id: doc.client_id,
            message_type: doc.message_type,
            status: doc.status,
            timestamp: doc.timestamp.and_then(to_chrono),
            created_at: doc.created_at.and_then(to_chrono),
            updated_at: doc.updated_at.and_then(to_chrono),
            processed_at: doc.processed_at.and_then(to_chrono),
            created_by: doc.created_by,
            metadata: doc.metadata,
        }
        .into_message(doc.id.to_hex())
    }
}

#[derive(Debug, Deserialize)]
pub struct AggregationDocument {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub variable: String,
    #[serde(default)]
    pub period: String,
    pub timestamp: bson::DateTime,
    #[serde(default)]
    pub sum: f64,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
    #[serde(default)]
    pub avg: f64,
}

impl From<AggregationDocument> for AggregatedData {
    fn from(doc: AggregationDocument) -> Self {
        AggregatedData {
            client_id: doc.client_id,
            channel: doc.channel,
            variable: doc.variable,
            period: doc.period,
            timestamp: to_chrono(doc.timestamp).unwrap_or_default(),
            sum: doc.sum,
            count: doc.count,
            min: doc.min,
            max: doc.max,
            avg: doc.avg,
        }
    }
}

fn to_chrono(dt: bson::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(dt.timestamp_millis())
}

fn to_bson_datetime(dt: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(dt.timestamp_millis())
}

// Query rendering

fn render_value(value: &FilterValue) -> StoreResult<Bson> {
    Ok(match value {
        FilterValue::Null => Bson::Null,
        FilterValue::Bool(b) => Bson::Boolean(*b),
        FilterValue::Int(i) => Bson::Int64(*i),
        FilterValue::Float(f) => Bson::Double(*f),
        FilterValue::String(s) => Bson::String(s.clone()),
        FilterValue::Time(t) => Bson::DateTime(to_bson_datetime(*t)),
        FilterValue::Id(id) => Bson::ObjectId(object_id(id)?),
        FilterValue::List(items) => Bson::Array(items.iter().map(render_value).collect::<StoreResult<_>>()?),
        FilterValue::Map(map) => bson::to_bson(map).map_err(|e| StoreError::QueryError(e.to_string()))?,
    })
}

fn object_id(id: &MessageId) -> StoreResult<ObjectId> {
    ObjectId::parse_str(id.as_str()).map_err(|e| StoreError::QueryError(format!("invalid ObjectId '{}': {}", id, e)))
}

fn field_name(field: &FilterField) -> &str {
    match field {
        FilterField::Id => fields::ID,
        FilterField::Path(path) => path,
    }
}

fn operator(op: FilterOp) -> &'static str {
    match op {
        FilterOp::Eq => "$eq",
        FilterOp::Ne => "$ne",
        FilterOp::Gt => "$gt",
        FilterOp::Gte => "$gte",
        FilterOp::Lt => "$lt",
        FilterOp::Lte => "$lte",
        FilterOp::In => "$in",
        FilterOp::NIn => "$nin",
    }
}

fn render_condition(condition: &FilterCondition) -> StoreResult<Document> {
    let mut predicate = Document::new();
    predicate.insert(operator(condition.op), render_value(&condition.value)?);
    let mut rendered = Document::new();
    rendered.insert(field_name(&condition.field), predicate);
    Ok(rendered)
}

/// Renders conditions as a filter document. Several conditions are always combined with
/// `$and` so two predicates on the same field (client filter plus access restriction) both apply.
pub fn render_filter(conditions: &[FilterCondition]) -> StoreResult<Document> {
    match conditions {
        [] => Ok(Document::new()),
        [single] => render_condition(single),
        many => {
            let clauses = many.iter().map(|c| render_condition(c).map(Bson::Document)).collect::<StoreResult<Vec<_>>>()?;
            Ok(doc! { "$and": clauses })
        }
    }
}

/// Sort document; `_id` breaks ties so paging is stable.
pub fn render_sort(sort: &SortSpec) -> Document {
    let direction = match sort.direction {
        SortDirection::Asc => 1,
        SortDirection::Desc => -1,
    };
    let mut rendered = Document::new();
    rendered.insert(field_name(&sort.field), direction);
    if sort.field != FilterField::Id {
        rendered.insert(fields::ID, 1);
    }
    rendered
}

pub fn render_find_options(query: &MessageQuery) -> FindOptions {
    FindOptions::builder()
        .sort(render_sort(&query.sort))
        .skip(query.page.skip)
        .limit(query.page.limit as i64)
        .build()
}

fn newest_first(limit: u64) -> FindOptions {
    FindOptions::builder()
        .sort(doc! { "timestamp": -1, "_id": 1 })
        .limit(limit as i64)
        .build()
}

pub struct MongoMessageStore {
    db: Database,
    messages: Collection<MessageDocument>,
    aggregations: Collection<AggregationDocument>,
    timeout: Duration,
}

/// Driver options with every network phase bounded by `timeout`.
pub async fn client_options(uri: &str, timeout: Duration) -> StoreResult<ClientOptions> {
    let mut options = ClientOptions::parse(uri).await?;
    options.app_name = Some("iot-message-api".to_string());
    options.connect_timeout = Some(timeout);
    options.server_selection_timeout = Some(timeout);
    Ok(options)
}

/// Runs a driver call under a client-side deadline.
async fn bounded<T, F>(timeout: Duration, operation: &str, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(timeout, call).await.map_err(|_| {
        warn!("MongoDB {} exceeded {:?}", operation, timeout);
        StoreError::Timeout(format!("MongoDB {} exceeded {:?}", operation, timeout))
    })?
}

impl MongoMessageStore {
    pub async fn connect(uri: &str, db_name: &str, timeout: Duration) -> StoreResult<Self> {
        let client = Client::with_options(client_options(uri, timeout).await?)?;
        let store = Self::from_database(client.database(db_name), timeout);

        store
            .ping()
            .await
            .map_err(|e| StoreError::ConnectionError(format!("MongoDB ping failed: {}", e)))?;
        info!("Connected to MongoDB database '{}'", db_name);

        Ok(store)
    }

    pub fn from_database(db: Database, timeout: Duration) -> Self {
        Self {
            messages: db.collection(MESSAGES_COLLECTION),
            aggregations: db.collection(AGGREGATIONS_COLLECTION),
            db,
            timeout,
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        bounded(self.timeout, "ping", async {
            self.db.run_command(doc! { "ping": 1 }, None).await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn find_many(&self, filter: Document, mut options: FindOptions) -> StoreResult<Vec<Message>> {
        debug!("MongoDB find on {}: {}", MESSAGES_COLLECTION, filter);
        options.max_time = Some(self.timeout);
        bounded(self.timeout, "find", async {
            let cursor = self.messages.find(filter, options).await?;
            let documents: Vec<MessageDocument> = cursor.try_collect().await?;
            Ok::<_, StoreError>(documents.into_iter().map(Message::from).collect())
        })
        .await
    }

    async fn count(&self, filter: Document) -> StoreResult<u64> {
        let options = CountOptions::builder().max_time(self.timeout).build();
        bounded(self.timeout, "count", async {
            Ok::<_, StoreError>(self.messages.count_documents(filter, options).await?)
        })
        .await
    }
}

#[async_trait]
impl MessageStore for MongoMessageStore {
    async fn find_by_id(&self, id: &MessageId) -> StoreResult<Message> {
        let oid = object_id(id)?;
        let found = bounded(self.timeout, "find_one", async {
            Ok::<_, StoreError>(self.messages.find_one(doc! { "_id": oid }, None).await?)
        })
        .await?;
        found
            .map(Message::from)
            .ok_or_else(|| StoreError::NotFound(format!("message {} not found", id)))
    }

    async fn list(&self, query: &MessageQuery) -> StoreResult<PageResult<Message>> {
        let filter = render_filter(&query.conditions)?;
        let (items, total) = tokio::try_join!(
            self.find_many(filter.clone(), render_find_options(query)),
            self.count(filter),
        )?;
        Ok(PageResult { items, total })
    }

    async fn find_by_topic(&self, topic: &str, scope: ClientScope<'_>, limit: u64) -> StoreResult<Vec<Message>> {
        let filter = doc! {
            "topic": topic,
            "client_id": { "$in": scope.0.to_vec() },
        };
        self.find_many(filter, newest_first(limit)).await
    }

    async fn find_by_client_id(&self, client_id: &str, limit: u64) -> StoreResult<Vec<Message>> {
        self.find_many(doc! { "client_id": client_id }, newest_first(limit)).await
    }

    async fn find_by_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        scope: ClientScope<'_>,
        limit: u64,
    ) -> StoreResult<Vec<Message>> {
        let filter = doc! {
            "timestamp": { "$gte": to_bson_datetime(from), "$lte": to_bson_datetime(to) },
            "client_id": { "$in": scope.0.to_vec() },
        };
        self.find_many(filter, newest_first(limit)).await
    }
}

#[async_trait]
impl AggregationStore for MongoMessageStore {
    async fn aggregations_for_client(&self, client_id: &str, period: Option<&str>) -> StoreResult<Vec<AggregatedData>> {
        let mut filter = doc! { "client_id": client_id };
        if let Some(period) = period {
            filter.insert("period", period);
        }
        let options = FindOptions::builder()
            .sort(doc! { "timestamp": 1 })
            .max_time(self.timeout)
            .build();
        bounded(self.timeout, "aggregation find", async {
            let cursor = self.aggregations.find(filter, options).await?;
            let documents: Vec<AggregationDocument> = cursor.try_collect().await?;
            Ok::<_, StoreError>(documents.into_iter().map(AggregatedData::from).collect())
        })
        .await
    }
}

#[async_trait]
impl MessageBackend for MongoMessageStore {
    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    fn id_format(&self) -> IdFormat {
        IdFormat::ObjectId
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.ping().await
    }
}
