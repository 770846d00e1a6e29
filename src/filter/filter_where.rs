use serde_json::Value;

use crate::database::models::fields;

use super::error::FilterError;
use super::types::{FilterCondition, FilterField, FilterOp, FilterValue, IdFormat};

/// Parses a client-supplied filter object into typed conditions.
pub struct FilterWhere;

impl FilterWhere {
    pub fn parse(where_data: &Value, id_format: IdFormat) -> Result<Vec<FilterCondition>, FilterError> {
        match where_data {
            Value::Null => Ok(vec![]),
            Value::Object(obj) => {
                let mut conditions = Vec::new();
                for (key, value) in obj {
                    if key == fields::ID || key == "id" {
                        conditions.push(Self::parse_id_condition(value, id_format)?);
                    } else if key.starts_with('$') {
                        return Err(FilterError::UnsupportedOperator(key.clone()));
                    } else {
                        Self::validate_field(key)?;
                        conditions.extend(Self::parse_field_condition(key, value)?);
                    }
                }
                Ok(conditions)
            }
            _ => Err(FilterError::InvalidFilter("filter must be a JSON object".to_string())),
        }
    }

    /// Field paths are dotted identifiers: `metadata.site`, `client_id`.
    pub fn validate_field(field: &str) -> Result<(), FilterError> {
        let valid = !field.is_empty()
            && field.split('.').all(|segment| {
                let mut chars = segment.chars();
                match chars.next() {
                    Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                    }
                    _ => false,
                }
            });
        if valid {
            Ok(())
        } else {
            Err(FilterError::InvalidField(field.to_string()))
        }
    }

    fn parse_id_condition(value: &Value, id_format: IdFormat) -> Result<FilterCondition, FilterError> {
        let raw = value.as_str().ok_or(FilterError::InvalidIdValue)?;
        let id = id_format.parse(raw)?;
        Ok(FilterCondition {
            field: FilterField::Id,
            op: FilterOp::Eq,
            value: FilterValue::Id(id),
        })
    }

    fn parse_field_condition(field: &str, value: &Value) -> Result<Vec<FilterCondition>, FilterError> {
        let time_field = fields::is_time_field(field);

        match value {
            Value::Object(obj) if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) => {
                let mut conditions = Vec::with_capacity(obj.len());
                for (op_key, op_val) in obj {
                    let op = FilterOp::parse(op_key)?;
                    let operand = FilterValue::from_json(field, op_val, time_field)?;
                    if op.takes_list() && !matches!(operand, FilterValue::List(_)) {
                        return Err(FilterError::InvalidOperatorData(format!("{} requires an array", op_key)));
                    }
                    conditions.push(FilterCondition {
                        field: FilterField::Path(field.to_string()),
                        op,
                        value: operand,
                    });
                }
                Ok(conditions)
            }
            // Implicit equality: { field: value }
            _ => Ok(vec![FilterCondition::eq(
                field,
                FilterValue::from_json(field, value, time_field)?,
            )]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn implicit_equality() {
        let conditions = FilterWhere::parse(&json!({"topic": "a/b"}), IdFormat::ObjectId).unwrap();
        assert_eq!(conditions, vec![FilterCondition::eq("topic", FilterValue::String("a/b".into()))]);
    }

    #[test]
    fn operator_objects_expand_to_conditions() {
        let conditions = FilterWhere::parse(
            &json!({"timestamp": {"$gte": "2024-01-01T00:00:00Z", "$lt": "2024-02-01T00:00:00Z"}}),
            IdFormat::ObjectId,
        )
        .unwrap();
        assert_eq!(conditions.len(), 2);
        assert!(conditions.iter().all(|c| matches!(c.value, FilterValue::Time(_))));
    }

    #[test]
    fn invalid_object_id_is_rejected() {
        let err = FilterWhere::parse(&json!({"_id": "not-a-valid-id"}), IdFormat::ObjectId).unwrap_err();
        assert!(matches!(err, FilterError::InvalidId(_)));
    }

    #[test]
    fn non_string_id_is_rejected() {
        let err = FilterWhere::parse(&json!({"_id": 12}), IdFormat::DocumentKey).unwrap_err();
        assert!(matches!(err, FilterError::InvalidIdValue));
    }

    #[test]
    fn id_alias_is_accepted() {
        let conditions = FilterWhere::parse(&json!({"id": "abc_123"}), IdFormat::DocumentKey).unwrap();
        assert_eq!(conditions[0].field, FilterField::Id);
    }

    #[test]
    fn rejects_top_level_operators_and_bad_fields() {
        assert!(matches!(
            FilterWhere::parse(&json!({"$where": "1"}), IdFormat::ObjectId),
            Err(FilterError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            FilterWhere::parse(&json!({"a b": 1}), IdFormat::ObjectId),
            Err(FilterError::InvalidField(_))
        ));
        assert!(matches!(
            FilterWhere::parse(&json!({"status": {"$regex": "x"}}), IdFormat::ObjectId),
            Err(FilterError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            FilterWhere::parse(&json!({"status": {"$in": "x"}}), IdFormat::ObjectId),
            Err(FilterError::InvalidOperatorData(_))
        ));
        assert!(FilterWhere::parse(&json!([1, 2]), IdFormat::ObjectId).is_err());
    }

    #[test]
    fn nested_paths_are_valid() {
        assert!(FilterWhere::validate_field("metadata.site").is_ok());
        assert!(FilterWhere::validate_field("metadata..site").is_err());
        assert!(FilterWhere::validate_field("1abc").is_err());
    }

    #[test]
    fn plain_object_values_compare_as_maps() {
        let conditions = FilterWhere::parse(&json!({"metadata": {"site": "a"}}), IdFormat::ObjectId).unwrap();
        assert!(matches!(conditions[0].value, FilterValue::Map(_)));
    }
}
