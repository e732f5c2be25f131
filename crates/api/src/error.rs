use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use crawler_core::CrawlerError;
use tracing::error;

use crate::response::ApiResponse;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Crawler(#[from] CrawlerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Crawler(err) => match err {
                CrawlerError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                CrawlerError::UnsupportedPlatform(_) => {
                    (StatusCode::BAD_REQUEST, "UNSUPPORTED_PLATFORM")
                }
                CrawlerError::TaskNotFound { .. } => (StatusCode::NOT_FOUND, "TASK_NOT_FOUND"),
                CrawlerError::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
                CrawlerError::QueueFull => (StatusCode::SERVICE_UNAVAILABLE, "QUEUE_FULL"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        }

        (status, ApiResponse::failure(code, self.to_string())).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
