//! HTTP adapters - plain HTTP routes and cross-cutting layers.

pub mod routes;

pub use routes::{app_router, cors_layer, HealthResponse, HealthState, BANNER};
