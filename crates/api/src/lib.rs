//! HTTP API: ingress gate, operational endpoints, and pipeline wiring.

pub mod app;
pub mod config;
