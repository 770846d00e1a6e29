use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid field name: {0}")]
    InvalidField(String),

    #[error("Invalid message ID format: {0}")]
    InvalidId(String),

    #[error("Invalid filter value for _id")]
    InvalidIdValue,

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid operator data: {0}")]
    InvalidOperatorData(String),

    #[error("Invalid timestamp for {field}: {value}")]
    InvalidTimestamp { field: String, value: String },

    #[error("Invalid range parameter: {0}")]
    InvalidRange(String),

    #[error("Invalid sort parameter: {0}")]
    InvalidSort(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl FilterError {
    /// Name of the query parameter or field the error points at, when there is one.
    pub fn field(&self) -> Option<&str> {
        match self {
            FilterError::InvalidId(_) | FilterError::InvalidIdValue => Some("_id"),
            FilterError::InvalidTimestamp { field, .. } => Some(field),
            FilterError::InvalidRange(_) => Some("range"),
            FilterError::InvalidSort(_) => Some("sort"),
            FilterError::InvalidLimit(_) => Some("limit"),
            _ => None,
        }
    }
}
