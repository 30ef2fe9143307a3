//! API error taxonomy and its HTTP rendering

use crate::engines::EngineError;
use crate::journal::JournalError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use qrgate::CodecError;
use qrgate::audit::Detail;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("rate limit exceeded, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("{0}")]
    Codec(#[from] CodecError),

    #[error("{0}")]
    Library(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Codec(_) | ApiError::Library(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "invalid_input",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Codec(_) | ApiError::Library(_) => "processing_failed",
            ApiError::Storage(_) => "storage_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// What the operation log records for this failure
    pub fn detail(&self) -> Detail {
        match self {
            ApiError::RateLimited { .. } => Detail::RateLimited,
            other => Detail::failed(other.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::InvalidInput(msg) => ApiError::Validation(msg),
            EngineError::Failed(msg) | EngineError::Unavailable(msg) => ApiError::Library(msg),
        }
    }
}

impl From<JournalError> for ApiError {
    fn from(e: JournalError) -> Self {
        match e {
            JournalError::Audit(e) => ApiError::Storage(e.to_string()),
            closed @ JournalError::Closed => ApiError::Internal(closed.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
            "category": self.category(),
            "code": status.as_u16()
        }));

        let mut response = (status, body).into_response();
        if let ApiError::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let response = ApiError::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");

        let body = body_json(response).await;
        assert_eq!(body["category"], "rate_limited");
        assert_eq!(body["code"], 429);
    }

    #[tokio::test]
    async fn test_validation_response() {
        let response = ApiError::Validation("text is required".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());

        let body = body_json(response).await;
        assert_eq!(body["error"], "text is required");
        assert_eq!(body["category"], "invalid_input");
    }

    #[test]
    fn test_engine_error_mapping() {
        assert!(matches!(
            ApiError::from(EngineError::InvalidInput("bad color".into())),
            ApiError::Validation(_)
        ));
        let err = ApiError::from(EngineError::Failed("no QR code detected".into()));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.detail(), Detail::failed("no QR code detected"));
    }

    #[test]
    fn test_codec_and_storage_categories() {
        assert_eq!(ApiError::from(CodecError::Empty).category(), "processing_failed");
        assert_eq!(
            ApiError::from(JournalError::Closed).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::Storage("disk full".into()).category(), "storage_error");
        assert_eq!(ApiError::RateLimited { retry_after: 1 }.detail(), Detail::RateLimited);
    }
}
