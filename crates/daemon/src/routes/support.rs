//! Small shared helpers for turning domain results into HTTP responses
//! (§7 "single shared into-response conversion rather than ad hoc matching
//! at each call site").

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use imagebridge_wire::http_api::ApiErrorBody;
use serde::Serialize;
use serde_json::Value;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiErrorBody::new(message))).into_response()
}

pub fn ok_json<T: Serialize>(body: T) -> Response {
    Json(body).into_response()
}

/// `POST /workflow/convert`'s response is the one exception to "no
/// pretty-printing" (§6): pretty-printed JSON, no unicode escaping — which
/// `serde_json` already does by default.
pub fn pretty_json(value: Value) -> Response {
    match serde_json::to_string_pretty(&value) {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            text,
        )
            .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
