use axum::{
    extract::{Extension, State},
    response::Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::database::{ClientAggregations, Message};
use crate::middleware::{ApiPath, ApiQuery, ApiResult, ListResponse, RequestContext};

use super::{LimitQuery, ListQuery};

/// GET /api/message/device/:device_id - Paged messages of one permitted device
pub async fn get(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(device_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<ListResponse<Message>> {
    let page = state
        .service
        .list_messages_by_device_id(&ctx, &device_id, &query.into())
        .await?;
    Ok(page.into())
}

/// GET /api/message/device/:device_id/latest - Newest messages of one permitted device
pub async fn latest(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(device_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state
        .service
        .latest_messages_for_device(&ctx, &device_id, query.limit)
        .await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
pub struct AggregationQuery {
    pub period: Option<String>,
}

/// GET /api/message/aggregations/device/:device_id - Aggregated statistics grouped for graphing
pub async fn aggregations(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(device_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<AggregationQuery>,
) -> ApiResult<Json<ClientAggregations>> {
    let grouped = state
        .service
        .aggregations_for_device(&ctx, &device_id, query.period.as_deref())
        .await?;
    Ok(Json(grouped))
}
