use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::error::FilterError;

/// Comparison operators accepted inside a filter value: `{ "field": { "$gte": 3 } }`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NIn,
}

impl FilterOp {
    pub fn parse(op_key: &str) -> Result<Self, FilterError> {
        Ok(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        })
    }

    pub fn takes_list(&self) -> bool {
        matches!(self, FilterOp::In | FilterOp::NIn)
    }
}

/// Identifier syntax of the configured provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdFormat {
    /// 24 hex characters (MongoDB ObjectId)
    ObjectId,
    /// Firestore document key restricted to `[A-Za-z0-9_]{1,128}`
    DocumentKey,
}

impl IdFormat {
    pub fn parse(&self, raw: &str) -> Result<MessageId, FilterError> {
        let valid = match self {
            IdFormat::ObjectId => raw.len() == 24 && raw.chars().all(|c| c.is_ascii_hexdigit()),
            IdFormat::DocumentKey => {
                !raw.is_empty()
                    && raw.len() <= 128
                    && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
        };
        if valid {
            Ok(MessageId(raw.to_string()))
        } else {
            Err(FilterError::InvalidId(raw.to_string()))
        }
    }
}

/// A message identifier already validated against an [`IdFormat`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed filter operand, independent of any backing store
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Time(DateTime<Utc>),
    Id(MessageId),
    List(Vec<FilterValue>),
    Map(Map<String, Value>),
}

impl FilterValue {
    /// Convert a JSON operand. Strings on timestamp fields must be RFC 3339.
    pub fn from_json(field: &str, value: &Value, time_field: bool) -> Result<Self, FilterError> {
        Ok(match value {
            Value::Null => FilterValue::Null,
            Value::Bool(b) => FilterValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FilterValue::Int(i),
                None => FilterValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) if time_field => {
                let parsed = DateTime::parse_from_rfc3339(s).map_err(|_| FilterError::InvalidTimestamp {
                    field: field.to_string(),
                    value: s.clone(),
                })?;
                FilterValue::Time(parsed.with_timezone(&Utc))
            }
            Value::String(s) => FilterValue::String(s.clone()),
            Value::Array(items) => FilterValue::List(
                items
                    .iter()
                    .map(|item| Self::from_json(field, item, time_field))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => FilterValue::Map(map.clone()),
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FilterValue::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterField {
    /// The store-assigned document identifier
    Id,
    /// A (possibly dotted) document field path
    Path(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub field: FilterField,
    pub op: FilterOp,
    pub value: FilterValue,
}

impl FilterCondition {
    pub fn eq(field: impl Into<String>, value: FilterValue) -> Self {
        Self {
            field: FilterField::Path(field.into()),
            op: FilterOp::Eq,
            value,
        }
    }

    pub fn one_of(field: impl Into<String>, values: impl IntoIterator<Item = String>) -> Self {
        Self {
            field: FilterField::Path(field.into()),
            op: FilterOp::In,
            value: FilterValue::List(values.into_iter().map(FilterValue::String).collect()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// `"ASC"` is the only token producing ascending order; everything else sorts descending.
    pub fn from_token(token: &str) -> Self {
        if token == "ASC" {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: FilterField,
    pub direction: SortDirection,
}

/// Zero-based offset plus page size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    pub limit: u64,
}

/// A provider-neutral message query. Each store renders it into its native API.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageQuery {
    pub conditions: Vec<FilterCondition>,
    pub sort: SortSpec,
    pub page: Page,
}

/// One page of results plus the filter-only total
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_id_format() {
        assert!(IdFormat::ObjectId.parse("65f1c2a9b3e4d5f6a7b8c9d0").is_ok());
        assert!(IdFormat::ObjectId.parse("not-a-valid-id").is_err());
        assert!(IdFormat::ObjectId.parse("65f1c2a9b3e4d5f6a7b8c9d").is_err());
        assert!(IdFormat::ObjectId.parse("zzf1c2a9b3e4d5f6a7b8c9d0").is_err());
    }

    #[test]
    fn document_key_format() {
        assert!(IdFormat::DocumentKey.parse("Xy7Q2abc_09").is_ok());
        assert!(IdFormat::DocumentKey.parse("not-a-valid-id").is_err());
        assert!(IdFormat::DocumentKey.parse("").is_err());
        assert!(IdFormat::DocumentKey.parse("messages/abc").is_err());
        assert!(IdFormat::DocumentKey.parse(&"a".repeat(129)).is_err());
    }

    #[test]
    fn only_exact_asc_is_ascending() {
        assert_eq!(SortDirection::from_token("ASC"), SortDirection::Asc);
        assert_eq!(SortDirection::from_token("asc"), SortDirection::Desc);
        assert_eq!(SortDirection::from_token("DESC"), SortDirection::Desc);
        assert_eq!(SortDirection::from_token(""), SortDirection::Desc);
    }

    #[test]
    fn time_fields_parse_rfc3339() {
        let v = FilterValue::from_json("timestamp", &json!("2024-01-02T03:04:05+02:00"), true).unwrap();
        match v {
            FilterValue::Time(t) => assert_eq!(t.to_rfc3339(), "2024-01-02T01:04:05+00:00"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(FilterValue::from_json("timestamp", &json!("yesterday"), true).is_err());
        assert_eq!(
            FilterValue::from_json("topic", &json!("yesterday"), false).unwrap(),
            FilterValue::String("yesterday".into())
        );
    }
}
