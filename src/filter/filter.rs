use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterCondition, IdFormat, MessageQuery, Page, SortSpec};

/// Builds a [`MessageQuery`] from the generic list shape (filter map, sort, skip/limit).
pub struct Filter {
    id_format: IdFormat,
    conditions: Vec<FilterCondition>,
    restrictions: Vec<FilterCondition>,
    sort: SortSpec,
    page: Page,
    max_limit: u64,
}

impl Filter {
    pub const DEFAULT_LIMIT: u64 = 10;

    pub fn new(id_format: IdFormat, max_limit: u64) -> Self {
        Self {
            id_format,
            conditions: vec![],
            restrictions: vec![],
            sort: FilterOrder::default_spec(),
            page: Page { skip: 0, limit: Self::DEFAULT_LIMIT },
            max_limit,
        }
    }

    pub fn where_clause(&mut self, conditions: &Value) -> Result<&mut Self, FilterError> {
        self.conditions = FilterWhere::parse(conditions, self.id_format)?;
        Ok(self)
    }

    pub fn order(&mut self, field: &str, order: &str) -> Result<&mut Self, FilterError> {
        self.sort = FilterOrder::parse(field, order)?;
        Ok(self)
    }

    pub fn limit(&mut self, skip: u64, limit: u64) -> Result<&mut Self, FilterError> {
        if limit == 0 {
            return Err(FilterError::InvalidLimit("limit must be positive".to_string()));
        }
        let applied = if limit > self.max_limit {
            tracing::debug!("Limit {} exceeds max {}, capping to max", limit, self.max_limit);
            self.max_limit
        } else {
            limit
        };
        self.page = Page { skip, limit: applied };
        Ok(self)
    }

    pub fn page(&mut self, page: Page) -> Result<&mut Self, FilterError> {
        self.limit(page.skip, page.limit)
    }

    /// Adds a condition that is always applied on top of the client filter.
    pub fn restrict(&mut self, condition: FilterCondition) -> &mut Self {
        self.restrictions.push(condition);
        self
    }

    pub fn build(&self) -> MessageQuery {
        let mut conditions = self.conditions.clone();
        conditions.extend(self.restrictions.iter().cloned());
        MessageQuery {
            conditions,
            sort: self.sort.clone(),
            page: self.page,
        }
    }
}
