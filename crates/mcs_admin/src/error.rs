//! Maps `McsError` onto the admin API's structured JSON error body
//! (spec.md §4.8, §7: "HTTP handler errors return structured JSON with an
//! `error` field and do not crash the admin server").

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mcs_protocol::{ErrorResponse, McsError};

pub struct ApiError(pub McsError);

impl From<McsError> for ApiError {
    fn from(err: McsError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
