//! HTTP application wiring (Axum router + pipeline wiring).
//!
//! This folder is structured like:
//! - `services.rs`: pipeline wiring (queue, object store, workers, outbox relay)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{build_pipeline, AppServices, Pipeline};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let api = routes::router().layer(Extension(services));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(api)
}
