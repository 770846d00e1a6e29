use axum::{
    extract::{Extension, State},
    response::Json,
};

use crate::app::AppState;
use crate::database::Message;
use crate::middleware::{ApiPath, ApiResult, RequestContext};

/// GET /api/message/:id - Get a single message by its store identifier
pub async fn get(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<Message>> {
    let message = state.service.get_message_by_id(&ctx, &id).await?;
    Ok(Json(message))
}
