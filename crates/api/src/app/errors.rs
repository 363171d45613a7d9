use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use paylake_infra::OutboxError;
use paylake_queue::QueueError;

pub fn queue_error_to_response(err: QueueError) -> axum::response::Response {
    match err {
        QueueError::Backend(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "queue_unavailable", msg)
        }
        QueueError::Serialization(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "serialization_error", msg)
        }
        QueueError::Config(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "queue_misconfigured", msg)
        }
    }
}

pub fn outbox_error_to_response(err: OutboxError) -> axum::response::Response {
    match err {
        OutboxError::NotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("outbox event {id} not found"),
        ),
        OutboxError::AlreadyExists(id) => json_error(
            StatusCode::CONFLICT,
            "conflict",
            format!("outbox event {id} already exists"),
        ),
        OutboxError::Storage(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "outbox_unavailable", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
