//! Parsing of the react-admin style list parameters:
//! `range=[0,9]`, `sort=["timestamp","DESC"]`, `filter={"topic":"a/b"}`.

use serde_json::Value;

use super::error::FilterError;
use super::types::Page;

pub const DEFAULT_RANGE: &str = "[0,9]";
pub const DEFAULT_SORT: &str = r#"["timestamp","DESC"]"#;
pub const DEFAULT_FILTER: &str = "{}";

/// `[a, b]` (inclusive) becomes `skip = a`, `limit = b - a + 1`.
pub fn parse_range(raw: &str) -> Result<Page, FilterError> {
    let [start, end]: [i64; 2] =
        serde_json::from_str(raw).map_err(|_| FilterError::InvalidRange(raw.to_string()))?;
    if start < 0 || end < start {
        return Err(FilterError::InvalidRange(raw.to_string()));
    }
    let limit = end
        .checked_sub(start)
        .and_then(|span| span.checked_add(1))
        .ok_or_else(|| FilterError::InvalidRange(raw.to_string()))?;
    Ok(Page {
        skip: start as u64,
        limit: limit as u64,
    })
}

/// Returns `(field, order)` exactly as sent; defaulting happens in `FilterOrder`.
pub fn parse_sort(raw: &str) -> Result<(String, String), FilterError> {
    let [field, order]: [String; 2] =
        serde_json::from_str(raw).map_err(|_| FilterError::InvalidSort(raw.to_string()))?;
    Ok((field, order))
}

pub fn parse_filter(raw: &str) -> Result<Value, FilterError> {
    let value: Value = serde_json::from_str(raw)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(FilterError::InvalidFilter("filter must be a JSON object".to_string()))
    }
}

/// Header value for a returned page: `items <start>-<end>/<total>`.
/// An empty page yields `end = skip - 1`.
pub fn content_range(skip: u64, returned: usize, total: u64) -> String {
    let start = skip as i64;
    let end = start + returned as i64 - 1;
    format!("items {}-{}/{}", start, end, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_to_skip_and_limit() {
        assert_eq!(parse_range("[0,9]").unwrap(), Page { skip: 0, limit: 10 });
        assert_eq!(parse_range("[20, 29]").unwrap(), Page { skip: 20, limit: 10 });
        assert_eq!(parse_range("[5,5]").unwrap(), Page { skip: 5, limit: 1 });
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        for raw in ["", "[0]", "[0,1,2]", "[9,0]", "[-1,3]", "{\"a\":1}", "[\"a\",\"b\"]", "[0,9223372036854775807]"] {
            assert!(parse_range(raw).is_err(), "accepted {}", raw);
        }
    }

    #[test]
    fn widest_representable_range_is_accepted() {
        // Spans that fit in i64 stay valid; the filter caps the limit at max_limit.
        assert_eq!(
            parse_range("[1,9223372036854775807]").unwrap(),
            Page { skip: 1, limit: 9223372036854775807 }
        );
    }

    #[test]
    fn sort_tuple() {
        assert_eq!(parse_sort(DEFAULT_SORT).unwrap(), ("timestamp".into(), "DESC".into()));
        assert!(parse_sort("[\"timestamp\"]").is_err());
        assert!(parse_sort("timestamp").is_err());
    }

    #[test]
    fn filter_must_be_object() {
        assert!(parse_filter("{}").unwrap().is_object());
        assert!(parse_filter("[]").is_err());
        assert!(parse_filter("{oops").is_err());
    }

    #[test]
    fn content_range_for_full_and_empty_pages() {
        assert_eq!(content_range(0, 10, 42), "items 0-9/42");
        assert_eq!(content_range(40, 2, 42), "items 40-41/42");
        assert_eq!(content_range(50, 0, 42), "items 50-49/42");
        assert_eq!(content_range(0, 0, 0), "items 0--1/0");
    }
}
