use axum::{
    extract::{Extension, State},
    response::Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::database::Message;
use crate::middleware::{ApiQuery, ApiResult, RequestContext};

#[derive(Debug, Deserialize)]
pub struct TopicQuery {
    #[serde(default)]
    pub topic: String,
    pub limit: Option<u64>,
}

/// GET /api/message/topic?topic=&limit= - Newest messages on a topic, across permitted devices
pub async fn topic(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<TopicQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state.service.messages_by_topic(&ctx, &query.topic, query.limit).await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    pub limit: Option<u64>,
}

/// GET /api/message/window?from=&to=&limit= - Messages with `from <= timestamp <= to`
pub async fn window(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<WindowQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state
        .service
        .messages_in_window(&ctx, &query.from, &query.to, query.limit)
        .await?;
    Ok(Json(messages))
}
