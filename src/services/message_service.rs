//! Read operations on device messages, each restricted to the caller's permitted devices.
//!
//! Every operation takes the [`RequestContext`] explicitly and resolves the permitted set
//! fresh through the [`AccessResolver`]; nothing about a caller is cached between requests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use super::access::{AccessError, AccessResolver, PermittedSet};
use crate::database::models::{fields, ClientAggregations, Message};
use crate::database::{MessageBackend, StoreError};
use crate::filter::params::{self, DEFAULT_FILTER, DEFAULT_RANGE, DEFAULT_SORT};
use crate::filter::{Filter, FilterCondition, FilterError, FilterValue};
use crate::middleware::RequestContext;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] FilterError),

    #[error("Invalid parameter '{field}': {message}")]
    InvalidParameter { field: &'static str, message: String },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ServiceError::NotFound(msg),
            other => ServiceError::Store(other),
        }
    }
}

/// Raw list parameters as sent by the client (JSON-encoded strings)
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub filter: Option<String>,
    pub range: Option<String>,
    pub sort: Option<String>,
}

/// One page of messages plus what the caller needs for `Content-Range`
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub items: Vec<Message>,
    pub skip: u64,
    pub total: u64,
}

impl MessagePage {
    pub fn content_range(&self) -> String {
        params::content_range(self.skip, self.items.len(), self.total)
    }
}

pub struct MessageService {
    store: Arc<dyn MessageBackend>,
    access: Arc<dyn AccessResolver>,
    max_limit: u64,
}

impl MessageService {
    pub fn new(store: Arc<dyn MessageBackend>, access: Arc<dyn AccessResolver>, max_limit: u64) -> Self {
        Self {
            store,
            access,
            max_limit,
        }
    }

    pub fn store(&self) -> &Arc<dyn MessageBackend> {
        &self.store
    }

    /// Resolves the caller's devices; an empty set fails closed.
    async fn permitted(&self, ctx: &RequestContext) -> Result<PermittedSet, ServiceError> {
        let grants = self.access.resolve(ctx).await?;
        let permitted = PermittedSet::from_grants(&grants);
        if permitted.is_empty() {
            warn!("User {} has no permitted devices", ctx.user_id);
            return Err(ServiceError::AccessDenied("no devices are assigned to this user".to_string()));
        }
        debug!("User {} may read {} device(s)", ctx.user_id, permitted.client_ids().len());
        Ok(permitted)
    }

    async fn permitted_device(&self, ctx: &RequestContext, device_id: &str) -> Result<PermittedSet, ServiceError> {
        let permitted = self.permitted(ctx).await?;
        if !permitted.contains(device_id) {
            warn!("User {} denied access to device {}", ctx.user_id, device_id);
            return Err(ServiceError::AccessDenied(format!("device {} is not accessible", device_id)));
        }
        Ok(permitted)
    }

    fn convenience_limit(&self, limit: Option<u64>) -> Result<u64, ServiceError> {
        match limit {
            Some(0) => Err(ServiceError::InvalidParameter {
                field: "limit",
                message: "must be positive".to_string(),
            }),
            Some(n) => Ok(n.min(self.max_limit)),
            None => Ok(Filter::DEFAULT_LIMIT.min(self.max_limit)),
        }
    }

    fn list_filter(&self, range: Option<&str>, sort: Option<&str>) -> Result<Filter, ServiceError> {
        let page = params::parse_range(range.unwrap_or(DEFAULT_RANGE))?;
        let (sort_field, sort_order) = params::parse_sort(sort.unwrap_or(DEFAULT_SORT))?;

        let mut filter = Filter::new(self.store.id_format(), self.max_limit);
        filter.order(&sort_field, &sort_order)?.page(page)?;
        Ok(filter)
    }

    async fn run_list(&self, filter: &Filter) -> Result<MessagePage, ServiceError> {
        let query = filter.build();
        let result = self.store.list(&query).await?;
        Ok(MessagePage {
            items: result.items,
            skip: query.page.skip,
            total: result.total,
        })
    }

    pub async fn get_message_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Message, ServiceError> {
        let id = self.store.id_format().parse(id)?;
        let permitted = self.permitted(ctx).await?;

        let message = self.store.find_by_id(&id).await?;
        if !permitted.contains(&message.client_id) {
            warn!("User {} denied access to message {}", ctx.user_id, id);
            return Err(ServiceError::AccessDenied(format!("message {} is not accessible", id)));
        }
        Ok(message)
    }

    pub async fn list_messages(&self, ctx: &RequestContext, list: &ListParams) -> Result<MessagePage, ServiceError> {
        let conditions = params::parse_filter(list.filter.as_deref().unwrap_or(DEFAULT_FILTER))?;
        let mut filter = self.list_filter(list.range.as_deref(), list.sort.as_deref())?;
        filter.where_clause(&conditions)?;

        let permitted = self.permitted(ctx).await?;
        filter.restrict(FilterCondition::one_of(fields::CLIENT_ID, permitted.client_ids().iter().cloned()));
        self.run_list(&filter).await
    }

    pub async fn list_messages_by_device_id(
        &self,
        ctx: &RequestContext,
        device_id: &str,
        list: &ListParams,
    ) -> Result<MessagePage, ServiceError> {
        let mut filter = self.list_filter(list.range.as_deref(), list.sort.as_deref())?;

        self.permitted_device(ctx, device_id).await?;
        filter.restrict(FilterCondition::eq(fields::CLIENT_ID, FilterValue::String(device_id.to_string())));
        self.run_list(&filter).await
    }

    pub async fn latest_messages_for_device(
        &self,
        ctx: &RequestContext,
        device_id: &str,
        limit: Option<u64>,
    ) -> Result<Vec<Message>, ServiceError> {
        let limit = self.convenience_limit(limit)?;
        self.permitted_device(ctx, device_id).await?;
        Ok(self.store.find_by_client_id(device_id, limit).await?)
    }

    pub async fn messages_by_topic(
        &self,
        ctx: &RequestContext,
        topic: &str,
        limit: Option<u64>,
    ) -> Result<Vec<Message>, ServiceError> {
        if topic.trim().is_empty() {
            return Err(ServiceError::InvalidParameter {
                field: "topic",
                message: "is required".to_string(),
            });
        }
        let limit = self.convenience_limit(limit)?;
        let permitted = self.permitted(ctx).await?;
        Ok(self.store.find_by_topic(topic, permitted.scope(), limit).await?)
    }

    pub async fn messages_in_window(
        &self,
        ctx: &RequestContext,
        from: &str,
        to: &str,
        limit: Option<u64>,
    ) -> Result<Vec<Message>, ServiceError> {
        let from = parse_bound("from", from)?;
        let to = parse_bound("to", to)?;
        if from > to {
            return Err(ServiceError::InvalidParameter {
                field: "from",
                message: "must not be after 'to'".to_string(),
            });
        }
        let limit = self.convenience_limit(limit)?;
        let permitted = self.permitted(ctx).await?;
        Ok(self.store.find_by_time_range(from, to, permitted.scope(), limit).await?)
    }

    pub async fn aggregations_for_device(
        &self,
        ctx: &RequestContext,
        device_id: &str,
        period: Option<&str>,
    ) -> Result<ClientAggregations, ServiceError> {
        self.permitted_device(ctx, device_id).await?;
        let period = period.map(str::trim).filter(|p| !p.is_empty());
        let buckets = self.store.aggregations_for_client(device_id, period).await?;
        Ok(ClientAggregations::group(device_id, buckets))
    }
}

fn parse_bound(field: &'static str, raw: &str) -> Result<DateTime<Utc>, ServiceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ServiceError::InvalidParameter {
            field,
            message: format!("'{}' is not an RFC 3339 timestamp", raw),
        })
}
