use std::sync::Arc;

use axum::{
    extract::Extension, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use chrono::Utc;
use tracing::debug;

use paylake_infra::OutboxEvent;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/payments", post(accept_payment))
}

/// Transactional-producer edge: record the payment as a pending outbox event
/// instead of enqueueing it directly. The background relay feeds accepted
/// events into the same queue the gate writes to.
pub async fn accept_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::EnqueuePaymentRequest>,
) -> axum::response::Response {
    let envelope = body.into_envelope(Utc::now());

    let payload = match serde_json::to_value(&envelope) {
        Ok(v) => v,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "malformed_payment", e.to_string());
        }
    };

    let event = OutboxEvent::new(
        "payment",
        envelope.payment_id.clone(),
        "payment.accepted",
        payload,
    );

    match services.outbox.append(event) {
        Ok(event_id) => {
            debug!(
                payment_id = %envelope.payment_id,
                event_id = %event_id,
                "payment accepted into outbox"
            );
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "accepted": true,
                    "payment_id": envelope.payment_id,
                    "event_id": event_id.to_string(),
                })),
            )
                .into_response()
        }
        Err(e) => errors::outbox_error_to_response(e),
    }
}
