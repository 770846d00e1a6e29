use axum::{
    http::header::CONTENT_RANGE,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::services::MessagePage;

/// A JSON array with its `Content-Range` header (`items <start>-<end>/<total>`)
#[derive(Debug)]
pub struct ListResponse<T: Serialize> {
    pub items: Vec<T>,
    pub content_range: String,
}

impl<T: Serialize> IntoResponse for ListResponse<T> {
    fn into_response(self) -> Response {
        ([(CONTENT_RANGE, self.content_range)], Json(self.items)).into_response()
    }
}

impl From<MessagePage> for ListResponse<crate::database::Message> {
    fn from(page: MessagePage) -> Self {
        let content_range = page.content_range();
        Self {
            items: page.items,
            content_range,
        }
    }
}

pub type ApiResult<T> = Result<T, crate::error::ApiError>;
