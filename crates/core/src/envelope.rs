//! Payment envelope: the wire shape of a payment event.
//!
//! Every producer and consumer in the pipeline speaks this one flat JSON
//! shape: `{"payment_id": "...", "amount": 10.5, "ts": "2026-01-01T00:00:00Z"}`.
//! Decoding is strict (unknown fields and wrong types are rejected) so that
//! anything unparseable is classified as malformed at exactly one place.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// A single payment event.
///
/// `payment_id` is caller-supplied and unique per logical payment; the ingress
/// gate generates one when the caller omits it. `ts` is the event timestamp in
/// UTC and defaults to the enqueue time at the gate. A missing `payment_id`
/// decodes as the empty string so that [`PaymentEnvelope::validate`] is the
/// single place that rejects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentEnvelope {
    #[serde(default)]
    pub payment_id: String,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
}

impl PaymentEnvelope {
    pub fn new(payment_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            payment_id: payment_id.into(),
            amount,
            ts: None,
        }
    }

    pub fn with_ts(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = Some(ts);
        self
    }

    /// Strictly decode and validate a serialized envelope.
    ///
    /// Returns [`DomainError::Malformed`] when the bytes are not the expected
    /// JSON shape and [`DomainError::Validation`] when the decoded envelope
    /// fails structural validation. Both classes of failure get the same
    /// treatment downstream (never stored, never acknowledged).
    pub fn parse(bytes: &[u8]) -> DomainResult<Self> {
        let envelope: Self =
            serde_json::from_slice(bytes).map_err(|e| DomainError::malformed(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Structural validation: a payment must carry a non-empty `payment_id`.
    ///
    /// Amount sign/range checks are deliberately absent; business validation
    /// happens downstream of this pipeline.
    pub fn validate(&self) -> DomainResult<()> {
        if self.payment_id.is_empty() {
            return Err(DomainError::validation("payment_id is required"));
        }
        Ok(())
    }

    /// Serialize to the wire JSON shape.
    pub fn to_json(&self) -> DomainResult<String> {
        serde_json::to_string(self)
            .map_err(|e| DomainError::malformed(format!("envelope serialization failed: {e}")))
    }

    /// Apply the ingress gate's defaulting rules.
    ///
    /// A missing or empty `payment_id` is replaced with a generated one, and a
    /// missing `ts` becomes the time the gate received the event.
    pub fn with_ingress_defaults(mut self, received_at: DateTime<Utc>) -> Self {
        if self.payment_id.is_empty() {
            self.payment_id = Self::generate_payment_id();
        }
        if self.ts.is_none() {
            self.ts = Some(received_at);
        }
        self
    }

    /// Generate a payment id in the gate's `p-<10 hex chars>` format.
    pub fn generate_payment_id() -> String {
        let hex = Uuid::new_v4().simple().to_string();
        format!("p-{}", &hex[..10])
    }

    /// The UTC date this payment partitions under in the object store.
    ///
    /// The event timestamp wins when present; otherwise the processing
    /// instant decides.
    pub fn partition_date(&self, processed_at: DateTime<Utc>) -> NaiveDate {
        match self.ts {
            Some(ts) => ts.date_naive(),
            None => processed_at.date_naive(),
        }
    }
}
