use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use paylake_core::PaymentEnvelope;
use paylake_queue::DeadLetterEntry;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /payments` and `POST /outbox/payments`.
///
/// Unknown fields are ignored at the gate; re-serializing the envelope is
/// what pins the stored wire shape.
#[derive(Debug, Deserialize)]
pub struct EnqueuePaymentRequest {
    pub payment_id: Option<String>,
    pub amount: Decimal,
    pub ts: Option<DateTime<Utc>>,
}

impl EnqueuePaymentRequest {
    /// Build the complete envelope, minting a payment id and stamping the
    /// receive time where the caller left gaps.
    pub fn into_envelope(self, received_at: DateTime<Utc>) -> PaymentEnvelope {
        let envelope = PaymentEnvelope::new(self.payment_id.unwrap_or_default(), self.amount);
        let envelope = match self.ts {
            Some(ts) => envelope.with_ts(ts),
            None => envelope,
        };
        envelope.with_ingress_defaults(received_at)
    }
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn dead_letter_to_json(entry: DeadLetterEntry) -> serde_json::Value {
    serde_json::json!({
        "message_id": entry.message.id.to_string(),
        "body": entry.message.body,
        "receive_count": entry.message.receive_count,
        "enqueued_at": entry.message.enqueued_at.to_rfc3339(),
        "dead_lettered_at": entry.dead_lettered_at.to_rfc3339(),
        "reason": entry.reason,
    })
}
