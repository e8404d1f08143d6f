//! HTTP-facing error type.
//!
//! Every failure leaves the server as the JSON envelope
//! `{success: false, message, data?}` with a matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use sheetsync_core::messages::ApiResponse;
use tracing::error;

/// Errors returned by request handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or rejected input (400).
    #[error("{0}")]
    Validation(String),
    /// Input conflicts with existing state, e.g. a taken e-mail (409).
    #[error("{0}")]
    Conflict(String),
    /// Missing, invalid or expired credential (401).
    #[error("{0}")]
    Unauthorized(String),
    /// The spreadsheet service failed or is not configured (502).
    #[error("{message}")]
    Upstream {
        message: String,
        /// Upstream error body, passed through to the caller.
        detail: Option<Value>,
    },
    /// Unexpected server-side failure (500).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Internal(e) => {
                error!(error = %e, "request failed");
                ApiResponse::<Value>::failure("Internal Server Error")
            }
            Self::Upstream { message, detail } => ApiResponse {
                success: false,
                message,
                data: detail,
            },
            other => ApiResponse::failure(other.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::json;

    use super::*;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn statuses_and_envelope() {
        let (status, body) = render(ApiError::Conflict("email taken".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, json!({"success": false, "message": "email taken"}));

        let (status, _) = render(ApiError::Unauthorized("no".into())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = render(ApiError::Validation("bad".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upstream_detail_is_passed_through() {
        let (status, body) = render(ApiError::Upstream {
            message: "upstream returned 404".into(),
            detail: Some(json!({"error": {"code": 404}})),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["data"]["error"]["code"], 404);
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let (status, body) = render(ApiError::Internal(anyhow::anyhow!("db exploded"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal Server Error");
    }
}
