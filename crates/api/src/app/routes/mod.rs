use axum::Router;

pub mod ops;
pub mod outbox;
pub mod payments;
pub mod system;

/// Router for all pipeline endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/payments", payments::router())
        .nest("/outbox", outbox::router())
        .nest("/ops", ops::router())
}
