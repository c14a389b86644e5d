use crate::application::circulation::{
    CirculationError, ConflictReason, EntityKind, ForbiddenReason,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::types::{ErrorResponse, FieldError};

/// API層のエラー型
///
/// アプリケーション層のエラーをラップし、HTTPレスポンスへのマッピングを提供する。
#[derive(Debug)]
pub struct ApiError(CirculationError);

impl From<CirculationError> for ApiError {
    fn from(err: CirculationError) -> Self {
        ApiError(err)
    }
}

impl From<FieldError> for ApiError {
    fn from(err: FieldError) -> Self {
        ApiError(CirculationError::Invalid(err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            // 404 Not Found - 会員・書籍・貸出中記録が存在しない
            CirculationError::NotFound { kind, .. } => (
                StatusCode::NOT_FOUND,
                match kind {
                    EntityKind::Member => "MEMBER_NOT_FOUND",
                    EntityKind::Book => "BOOK_NOT_FOUND",
                    EntityKind::ActiveBorrow => "ACTIVE_BORROW_NOT_FOUND",
                },
            ),

            // 409 Conflict - 書籍の状態と競合
            CirculationError::Conflict { reason, .. } => (
                StatusCode::CONFLICT,
                match reason {
                    ConflictReason::OutOfStock => "OUT_OF_STOCK",
                },
            ),

            // 403 Forbidden - 会員が借りられない
            CirculationError::Forbidden { reason, .. } => (
                StatusCode::FORBIDDEN,
                match reason {
                    ForbiddenReason::PenaltyActive => "PENALTY_ACTIVE",
                    ForbiddenReason::BorrowLimitExceeded => "BORROW_LIMIT_EXCEEDED",
                },
            ),

            // 400 Bad Request
            CirculationError::Invalid(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),

            // 503 Service Unavailable - ストア障害。再試行は呼び出し元の判断
            CirculationError::Unavailable(e) => {
                tracing::error!("Storage unavailable: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE")
            }
        };

        // 内部エラーの詳細はログに記録し、クライアントには一般的なメッセージのみを返す
        let body = Json(ErrorResponse::new(error_type, self.0.to_string()));
        (status, body).into_response()
    }
}

/// 登録・参照ハンドラー用のエラー型
#[derive(Debug)]
pub enum QueryError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
}

impl From<FieldError> for QueryError {
    fn from(err: FieldError) -> Self {
        QueryError::BadRequest(err.to_string())
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            QueryError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            QueryError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            QueryError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            QueryError::Unavailable(msg) => {
                tracing::error!("Storage error in query handler: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unavailable",
                    "Storage is unavailable".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse::new(error_type, message));
        (status, body).into_response()
    }
}
