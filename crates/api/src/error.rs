//! # API 统一错误处理
//!
//! 将下层各 crate 的错误类型统一映射到 HTTP 状态码、机器可读错误码与 JSON 响应体。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use tickvault_core::store::error::StoreError;

use crate::types::ApiErrorResponse;

/// API 层统一错误枚举
#[derive(Error, Debug)]
pub enum ApiError {
    /// 所有鉴权通道均无效 (401)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authorization 头格式错误且没有其他有效凭证 (400)
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    /// 文件名无法识别或文件不存在 (404)
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// 请求参数错误 (400)
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// 不支持的输出格式 (400)
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// 网关未配置行情源 (503)
    #[error("feed unavailable: {0}")]
    FeedUnavailable(String),

    /// 下层故障 (500)
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// 响应体中的机器可读错误码
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::MalformedCredential(_) => "MALFORMED_CREDENTIAL",
            ApiError::FileNotFound(_) => "FILE_NOT_FOUND",
            ApiError::InvalidParameter(_) => "INVALID_PARAMETER",
            ApiError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ApiError::FeedUnavailable(_) => "FEED_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::MalformedCredential(_)
            | ApiError::InvalidParameter(_)
            | ApiError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            ApiError::FileNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::FeedUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// 将 `ApiError` 转换为 axum 的 HTTP 响应
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match self {
            ApiError::Internal(msg) => {
                // 内部错误只记录日志，不向客户端透传细节
                tracing::error!("internal error: {}", msg);
                "internal server error".to_string()
            }
            ApiError::Unauthorized(msg)
            | ApiError::MalformedCredential(msg)
            | ApiError::FileNotFound(msg)
            | ApiError::InvalidParameter(msg)
            | ApiError::UnsupportedFormat(msg)
            | ApiError::FeedUnavailable(msg) => msg,
        };

        (status, Json(ApiErrorResponse::new(message, code))).into_response()
    }
}

/// 从 `StoreError` 转换：找不到的文件按 404 返回，其余均视为内部故障
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(name) => ApiError::FileNotFound(name),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_code() {
        let err = ApiError::MalformedCredential("x".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "MALFORMED_CREDENTIAL");
        assert_eq!(
            ApiError::FeedUnavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_store_error_mapping() {
        let not_found: ApiError = StoreError::NotFound("a.csv".into()).into();
        assert!(matches!(not_found, ApiError::FileNotFound(ref n) if n == "a.csv"));

        let corrupt: ApiError = StoreError::Corrupt {
            name: "a.csv".into(),
            reason: "bad row".into(),
        }
        .into();
        assert_eq!(corrupt.code(), "INTERNAL_ERROR");
    }
}
