use crate::database::models::fields;

use super::error::FilterError;
use super::filter_where::FilterWhere;
use super::types::{FilterField, SortDirection, SortSpec};

pub struct FilterOrder;

impl FilterOrder {
    /// Newest first.
    pub fn default_spec() -> SortSpec {
        SortSpec {
            field: FilterField::Path(fields::TIMESTAMP.to_string()),
            direction: SortDirection::Desc,
        }
    }

    /// An empty field falls back to the event timestamp; only `"ASC"` sorts ascending.
    pub fn parse(field: &str, order: &str) -> Result<SortSpec, FilterError> {
        let field = match field.trim() {
            "" => FilterField::Path(fields::TIMESTAMP.to_string()),
            "_id" | "id" => FilterField::Id,
            other => {
                FilterWhere::validate_field(other).map_err(|_| FilterError::InvalidSort(format!("invalid sort field '{}'", other)))?;
                FilterField::Path(other.to_string())
            }
        };
        Ok(SortSpec {
            field,
            direction: SortDirection::from_token(order),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_field_defaults_to_timestamp_desc() {
        assert_eq!(FilterOrder::parse("", "").unwrap(), FilterOrder::default_spec());
    }

    #[test]
    fn asc_token_sorts_ascending() {
        let spec = FilterOrder::parse("topic", "ASC").unwrap();
        assert_eq!(spec.field, FilterField::Path("topic".into()));
        assert_eq!(spec.direction, SortDirection::Asc);
        assert_eq!(FilterOrder::parse("topic", "ascending").unwrap().direction, SortDirection::Desc);
    }

    #[test]
    fn id_sorts_by_document_identifier() {
        assert_eq!(FilterOrder::parse("id", "ASC").unwrap().field, FilterField::Id);
    }

    #[test]
    fn rejects_injection_in_field() {
        assert!(matches!(FilterOrder::parse("$natural", "ASC"), Err(FilterError::InvalidSort(_))));
    }
}
