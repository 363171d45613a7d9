use std::sync::Arc;

use axum::{
    extract::Extension, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use chrono::Utc;
use tracing::debug;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/", post(enqueue_payment))
}

/// Ingress gate: fill defaults, serialize, enqueue.
///
/// `200 {"enqueued": true}` means the payment is durably queued; the write
/// into the raw zone happens asynchronously.
pub async fn enqueue_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::EnqueuePaymentRequest>,
) -> axum::response::Response {
    let envelope = body.into_envelope(Utc::now());

    let serialized = match envelope.to_json() {
        Ok(s) => s,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "malformed_payment", e.to_string());
        }
    };

    match services.queue.enqueue(serialized) {
        Ok(message_id) => {
            debug!(
                payment_id = %envelope.payment_id,
                message_id = %message_id,
                "payment enqueued"
            );
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "enqueued": true,
                    "payment_id": envelope.payment_id,
                })),
            )
                .into_response()
        }
        Err(e) => errors::queue_error_to_response(e),
    }
}
