use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One aggregation bucket for a client/channel/variable/period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedData {
    pub client_id: String,
    pub channel: String,
    pub variable: String,
    pub period: String,
    pub timestamp: DateTime<Utc>,
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

/// channel -> variable -> period -> timestamp -> bucket
pub type AggregationTree =
    BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, AggregatedData>>>>;

/// All aggregation buckets of one client, grouped for graphing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientAggregations {
    pub client_id: String,
    pub aggregations: AggregationTree,
}

impl ClientAggregations {
    pub fn group(client_id: impl Into<String>, buckets: Vec<AggregatedData>) -> Self {
        let mut aggregations = AggregationTree::new();
        for bucket in buckets {
            let at = bucket.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
            aggregations
                .entry(bucket.channel.clone())
                .or_default()
                .entry(bucket.variable.clone())
                .or_default()
                .entry(bucket.period.clone())
                .or_default()
                .insert(at, bucket);
        }
        Self {
            client_id: client_id.into(),
            aggregations,
        }
    }
}
