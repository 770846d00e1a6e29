use axum::extract::{Extension, State};

use crate::app::AppState;
use crate::database::Message;
use crate::middleware::{ApiQuery, ApiResult, ListResponse, RequestContext};

use super::ListQuery;

/// GET /api/message - List the caller's messages with filter, range and sort
pub async fn get(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<ListResponse<Message>> {
    let page = state.service.list_messages(&ctx, &query.into()).await?;
    Ok(page.into())
}
