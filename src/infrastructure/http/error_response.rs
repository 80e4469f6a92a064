//! Maps `AppError` onto the HTTP error envelope every service returns (spec
//! §7): `{"code": "...", "message": "..."}` at the status `AppError::http_status`
//! names. Grounded on `infrastructure::http`'s axum `IntoResponse` adapters
//! in the other example repos this control plane borrows its web stack from
//! — the teacher had no HTTP layer of its own.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::errors::AppError;

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn fail_closed_serializes_as_503_with_a_stable_code() {
        let response = AppError::FailClosed("kill switch engaged".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["code"], "fail_closed");
    }
}
