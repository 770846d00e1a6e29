use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of an IoT message, derived from its MQTT topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Status,
    Event,
    Online,
    Command,
    Telemetry,
    Alert,
    Rpc,
    Unknown,
}

impl MessageType {
    /// Matching order matters: the first category whose name occurs in the topic wins.
    const TOPIC_ORDER: [MessageType; 7] = [
        MessageType::Status,
        MessageType::Event,
        MessageType::Online,
        MessageType::Command,
        MessageType::Telemetry,
        MessageType::Alert,
        MessageType::Rpc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Status => "status",
            MessageType::Event => "event",
            MessageType::Online => "online",
            MessageType::Command => "command",
            MessageType::Telemetry => "telemetry",
            MessageType::Alert => "alert",
            MessageType::Rpc => "rpc",
            MessageType::Unknown => "unknown",
        }
    }

    pub fn from_topic(topic: &str) -> Self {
        Self::TOPIC_ORDER
            .into_iter()
            .find(|kind| topic.contains(kind.as_str()))
            .unwrap_or(MessageType::Unknown)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "status" => Some(MessageType::Status),
            "event" => Some(MessageType::Event),
            "online" => Some(MessageType::Online),
            "command" => Some(MessageType::Command),
            "telemetry" => Some(MessageType::Telemetry),
            "alert" => Some(MessageType::Alert),
            "rpc" => Some(MessageType::Rpc),
            "unknown" => Some(MessageType::Unknown),
            _ => None,
        }
    }
}

/// Processing state of a message in the ingestion pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Received,
    Processed,
    Failed,
    Pending,
}

impl MessageStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "received" => Some(MessageStatus::Received),
            "processed" => Some(MessageStatus::Processed),
            "failed" => Some(MessageStatus::Failed),
            "pending" => Some(MessageStatus::Pending),
            _ => None,
        }
    }
}

/// A device message as returned to API clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub topic: String,
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_payload: Option<Value>,
    pub client_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Field names shared by every backing store
pub mod fields {
    pub const ID: &str = "_id";
    pub const TOPIC: &str = "topic";
    pub const CLIENT_ID: &str = "client_id";
    pub const TIMESTAMP: &str = "timestamp";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
    pub const PROCESSED_AT: &str = "processed_at";

    /// Fields stored as timestamps; filter values for them are parsed as RFC 3339.
    pub const TIME_FIELDS: [&str; 4] = [TIMESTAMP, CREATED_AT, UPDATED_AT, PROCESSED_AT];

    pub fn is_time_field(field: &str) -> bool {
        TIME_FIELDS.contains(&field)
    }
}

/// Store-neutral shape of a persisted message, as decoded from JSON-like documents.
///
/// Ingestion may omit `type` and `status`; they are filled in on read.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredMessage {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub parsed_payload: Option<Value>,
    #[serde(default)]
    pub client_id: String,
    #[serde(default, rename = "type")]
    pub message_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StoredMessage {
    pub fn into_message(self, id: impl Into<String>) -> Message {
        let message_type = self
            .message_type
            .as_deref()
            .and_then(MessageType::parse)
            .unwrap_or_else(|| MessageType::from_topic(&self.topic));
        let status = self
            .status
            .as_deref()
            .and_then(MessageStatus::parse)
            .unwrap_or_default();
        let created_at = self.created_at.or(self.timestamp).unwrap_or_default();

        Message {
            id: id.into(),
            message_type,
            status,
            timestamp: self.timestamp.unwrap_or(created_at),
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
            processed_at: self.processed_at,
            created_by: self.created_by.unwrap_or_default(),
            metadata: self.metadata,
            topic: self.topic,
            payload: self.payload,
            parsed_payload: self.parsed_payload,
            client_id: self.client_id,
        }
    }
}

/// Input for stores that accept writes (the in-memory reference store)
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub topic: String,
    pub payload: String,
    pub parsed_payload: Option<Value>,
    pub client_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub created_by: String,
    pub metadata: HashMap<String, String>,
}
