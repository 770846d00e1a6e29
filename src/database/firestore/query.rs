//! Rendering of provider-neutral conditions into Firestore `StructuredQuery` JSON.

use serde_json::{json, Value};
use tracing::warn;

use super::value::encode_filter_value;
use crate::database::{StoreError, StoreResult};
use crate::filter::{FilterCondition, FilterField, FilterOp, FilterValue, SortDirection, SortSpec};

/// Firestore rejects `IN` / `NOT_IN` filters with more values than this.
pub const MAX_DISJUNCTION_VALUES: usize = 30;

const DOCUMENT_NAME: &str = "__name__";
pub const COUNT_ALIAS: &str = "total";

/// Where a query runs: the collection id plus its full resource path for references.
#[derive(Debug, Clone)]
pub struct QueryTarget<'a> {
    pub collection_id: &'a str,
    pub collection_path: &'a str,
}

fn field_reference(field: &FilterField) -> Value {
    let path = match field {
        FilterField::Id => DOCUMENT_NAME,
        FilterField::Path(path) => path.as_str(),
    };
    json!({ "fieldPath": path })
}

fn field_operator(op: FilterOp) -> &'static str {
    match op {
        FilterOp::Eq => "EQUAL",
        FilterOp::Ne => "NOT_EQUAL",
        FilterOp::Gt => "GREATER_THAN",
        FilterOp::Gte => "GREATER_THAN_OR_EQUAL",
        FilterOp::Lt => "LESS_THAN",
        FilterOp::Lte => "LESS_THAN_OR_EQUAL",
        FilterOp::In => "IN",
        FilterOp::NIn => "NOT_IN",
    }
}

fn render_condition(condition: &FilterCondition, target: &QueryTarget<'_>) -> StoreResult<Value> {
    let field = field_reference(&condition.field);

    // Null equality is only expressible as a unary filter
    if condition.value.is_null() {
        match condition.op {
            FilterOp::Eq => return Ok(json!({ "unaryFilter": { "op": "IS_NULL", "field": field } })),
            FilterOp::Ne => return Ok(json!({ "unaryFilter": { "op": "IS_NOT_NULL", "field": field } })),
            _ => {}
        }
    }

    if let FilterValue::List(items) = &condition.value {
        if condition.op.takes_list() && items.len() > MAX_DISJUNCTION_VALUES {
            warn!(
                field = field["fieldPath"].as_str().unwrap_or_default(),
                values = items.len(),
                limit = MAX_DISJUNCTION_VALUES,
                "Disjunction exceeds the Firestore value limit"
            );
            return Err(StoreError::QueryError(format!(
                "Firestore supports at most {} values in an {} filter, got {}",
                MAX_DISJUNCTION_VALUES,
                field_operator(condition.op),
                items.len()
            )));
        }
    }

    Ok(json!({
        "fieldFilter": {
            "field": field,
            "op": field_operator(condition.op),
            "value": encode_filter_value(&condition.value, target.collection_path),
        }
    }))
}

/// `None` when there are no conditions; a composite `AND` when there are several.
pub fn render_where(conditions: &[FilterCondition], target: &QueryTarget<'_>) -> StoreResult<Option<Value>> {
    let mut filters = conditions
        .iter()
        .map(|c| render_condition(c, target))
        .collect::<StoreResult<Vec<_>>>()?;

    Ok(match filters.len() {
        0 => None,
        1 => filters.pop(),
        _ => Some(json!({ "compositeFilter": { "op": "AND", "filters": filters } })),
    })
}

/// Orders by the requested field, then by document name so paging is stable.
pub fn render_order(sort: &SortSpec) -> Value {
    let direction = match sort.direction {
        SortDirection::Asc => "ASCENDING",
        SortDirection::Desc => "DESCENDING",
    };
    let mut orders = vec![json!({ "field": field_reference(&sort.field), "direction": direction })];
    if sort.field != FilterField::Id {
        orders.push(json!({ "field": { "fieldPath": DOCUMENT_NAME }, "direction": "ASCENDING" }));
    }
    Value::Array(orders)
}

/// Shared by paging and counting. `orderBy` is kept on both because Firestore skips
/// documents that lack an ordered field, so the total covers exactly what paging can reach.
fn base_query(
    conditions: &[FilterCondition],
    sort: &SortSpec,
    target: &QueryTarget<'_>,
) -> StoreResult<serde_json::Map<String, Value>> {
    let mut query = serde_json::Map::new();
    query.insert("from".to_string(), json!([{ "collectionId": target.collection_id }]));
    if let Some(filter) = render_where(conditions, target)? {
        query.insert("where".to_string(), filter);
    }
    query.insert("orderBy".to_string(), render_order(sort));
    Ok(query)
}

/// Body for `documents:runQuery`.
pub fn render_run_query(
    conditions: &[FilterCondition],
    sort: &SortSpec,
    skip: u64,
    limit: u64,
    target: &QueryTarget<'_>,
) -> StoreResult<Value> {
    let mut query = base_query(conditions, sort, target)?;
    if skip > 0 {
        query.insert("offset".to_string(), json!(skip));
    }
    query.insert("limit".to_string(), json!(limit));
    Ok(json!({ "structuredQuery": query }))
}

/// Body for `documents:runAggregationQuery` counting every document the matching
/// `runQuery` would page through.
pub fn render_count_query(
    conditions: &[FilterCondition],
    sort: &SortSpec,
    target: &QueryTarget<'_>,
) -> StoreResult<Value> {
    let query = base_query(conditions, sort, target)?;
    Ok(json!({
        "structuredAggregationQuery": {
            "structuredQuery": query,
            "aggregations": [{ "alias": COUNT_ALIAS, "count": {} }],
        }
    }))
}

/// Extracts the count from a `runAggregationQuery` response stream.
pub fn parse_count(responses: &[Value]) -> StoreResult<u64> {
    responses
        .iter()
        .find_map(|r| r.pointer(&format!("/result/aggregateFields/{}/integerValue", COUNT_ALIAS)))
        .and_then(|v| match v {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        })
        .ok_or_else(|| StoreError::DecodeError("aggregation response carried no count".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, IdFormat};

    const TARGET: QueryTarget<'static> = QueryTarget {
        collection_id: "messages",
        collection_path: "projects/p/databases/(default)/documents/messages",
    };

    #[test]
    fn empty_conditions_have_no_where() {
        let body = render_run_query(&[], &Filter::new(IdFormat::DocumentKey, 100).build().sort, 0, 10, &TARGET).unwrap();
        assert_eq!(
            body,
            json!({"structuredQuery": {
                "from": [{"collectionId": "messages"}],
                "orderBy": [
                    {"field": {"fieldPath": "timestamp"}, "direction": "DESCENDING"},
                    {"field": {"fieldPath": "__name__"}, "direction": "ASCENDING"}
                ],
                "limit": 10
            }})
        );
    }

    #[test]
    fn restriction_and_filter_become_composite_and() {
        let query = Filter::new(IdFormat::DocumentKey, 100)
            .where_clause(&json!({"topic": "a/b", "_id": "Ab12"}))
            .unwrap()
            .restrict(FilterCondition::one_of("client_id", vec!["dev-1".to_string()]))
            .build();
        let filter = render_where(&query.conditions, &TARGET).unwrap().unwrap();

        let filters = filter["compositeFilter"]["filters"].as_array().unwrap();
        assert_eq!(filter["compositeFilter"]["op"], "AND");
        assert_eq!(filters.len(), 3);
        assert!(filters.contains(&json!({"fieldFilter": {
            "field": {"fieldPath": "__name__"},
            "op": "EQUAL",
            "value": {"referenceValue": "projects/p/databases/(default)/documents/messages/Ab12"}
        }})));
        assert_eq!(
            filters[2],
            json!({"fieldFilter": {
                "field": {"fieldPath": "client_id"},
                "op": "IN",
                "value": {"arrayValue": {"values": [{"stringValue": "dev-1"}]}}
            }})
        );
    }

    #[test]
    fn null_equality_is_unary() {
        let query = Filter::new(IdFormat::DocumentKey, 100)
            .where_clause(&json!({"processed_at": null}))
            .unwrap()
            .build();
        assert_eq!(
            render_where(&query.conditions, &TARGET).unwrap(),
            Some(json!({"unaryFilter": {"op": "IS_NULL", "field": {"fieldPath": "processed_at"}}}))
        );
    }

    #[test]
    fn oversized_in_is_rejected() {
        let ids: Vec<String> = (0..31).map(|i| format!("dev-{}", i)).collect();
        let condition = FilterCondition::one_of("client_id", ids);
        assert!(matches!(render_where(&[condition], &TARGET), Err(StoreError::QueryError(_))));
    }

    #[test]
    fn paging_and_count_bodies() {
        let sort = Filter::new(IdFormat::DocumentKey, 100).order("topic", "ASC").unwrap().build().sort;
        let body = render_run_query(&[], &sort, 20, 10, &TARGET).unwrap();
        assert_eq!(body["structuredQuery"]["offset"], 20);
        assert_eq!(body["structuredQuery"]["orderBy"][0]["direction"], "ASCENDING");

        let count = render_count_query(&[], &sort, &TARGET).unwrap();
        assert_eq!(count["structuredAggregationQuery"]["aggregations"][0]["alias"], "total");
        assert!(count["structuredAggregationQuery"]["structuredQuery"].get("limit").is_none());
    }

    #[test]
    fn count_shares_the_page_filter_and_order() {
        let query = Filter::new(IdFormat::DocumentKey, 100)
            .where_clause(&json!({"type": "telemetry"}))
            .unwrap()
            .order("payload.battery", "DESC")
            .unwrap()
            .limit(5, 10)
            .unwrap()
            .build();
        let page = render_run_query(&query.conditions, &query.sort, query.page.skip, query.page.limit, &TARGET).unwrap();
        let count = render_count_query(&query.conditions, &query.sort, &TARGET).unwrap();

        let page = &page["structuredQuery"];
        let counted = &count["structuredAggregationQuery"]["structuredQuery"];
        assert_eq!(counted["where"], page["where"]);
        assert_eq!(counted["orderBy"], page["orderBy"]);
        assert_eq!(counted["orderBy"][0]["field"]["fieldPath"], "payload.battery");
        assert!(counted.get("offset").is_none());
    }

    #[test]
    fn count_is_read_from_aggregate_fields() {
        let responses = vec![json!({
            "result": {"aggregateFields": {"total": {"integerValue": "42"}}},
            "readTime": "2024-01-01T00:00:00Z"
        })];
        assert_eq!(parse_count(&responses).unwrap(), 42);
        assert!(parse_count(&[json!({"readTime": "x"})]).is_err());
    }
}
