use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::models::{ErrorResponse, SummaryResponse};

pub fn success(summary: String) -> Response {
    (StatusCode::OK, Json(SummaryResponse { summary })).into_response()
}

pub fn error(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}
