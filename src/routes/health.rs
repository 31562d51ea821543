// src/routes/health.rs
//! Liveness endpoint for the status engine API.
//!
//! Used by container orchestrators and CI to verify the process is up and
//! serving HTTP. It is a sibling module in the `routes` directory and
//! follows the Explicit Module Boundary Pattern (EMBP):
//! - Internal to this file: the handler and its response type
//! - Exports to the gateway (`mod.rs`): a subrouter with the `/health` route

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Handle `GET /health`.
///
/// Never touches the document store, so a slow or unreachable store does
/// not make the service look dead.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Create a subrouter containing the `/health` route.
///
/// Generic over the application state so it merges with the gateway
/// router whatever store type the state carries.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
