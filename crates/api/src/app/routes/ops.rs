use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Dead letters returned when no `limit` is given.
const DEFAULT_DEAD_LETTER_LIMIT: usize = 50;

pub fn router() -> Router {
    Router::new()
        .route("/queues", get(queue_counts))
        .route("/dead-letters", get(list_dead_letters))
        .route("/dead-letters/purge", post(purge_dead_letters))
        .route("/outbox", get(outbox_stats))
}

pub async fn queue_counts(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let counts = match services.queue.counts() {
        Ok(c) => c,
        Err(e) => return errors::queue_error_to_response(e),
    };
    let dead_letters = match services.queue.dead_letter_count() {
        Ok(n) => n,
        Err(e) => return errors::queue_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "primary": counts,
            "total": counts.total(),
            "dead_letters": dead_letters,
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    pub limit: Option<usize>,
}

pub async fn list_dead_letters(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<DeadLetterQuery>,
) -> axum::response::Response {
    let limit = query.limit.unwrap_or(DEFAULT_DEAD_LETTER_LIMIT);

    match services.queue.list_dead_letters(limit) {
        Ok(entries) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "count": entries.len(),
                "entries": entries
                    .into_iter()
                    .map(dto::dead_letter_to_json)
                    .collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => errors::queue_error_to_response(e),
    }
}

pub async fn purge_dead_letters(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.queue.purge_dead_letters() {
        Ok(purged) => {
            (StatusCode::OK, Json(serde_json::json!({"purged": purged}))).into_response()
        }
        Err(e) => errors::queue_error_to_response(e),
    }
}

pub async fn outbox_stats(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.outbox.stats() {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => errors::outbox_error_to_response(e),
    }
}
