//! HTTP gateway for the presentation layer.
//!
//! Each sibling module owns one endpoint group and exports a subrouter;
//! this module merges them and attaches the shared `(store, config)` state.

use axum::Router;

use crate::store::DocumentStore;
use crate::Config;

mod api_error;
mod get_adherence;
mod get_alerts;
mod get_zone;
mod health;
mod put_schedule;

pub use api_error::ApiError;

// ---

/// Handler state: the document store plus the loaded configuration.
pub type AppState<S> = (S, Config);

pub fn router<S: DocumentStore>(store: S, config: Config) -> Router {
    // ---
    Router::new()
        .merge(get_adherence::router::<S>())
        .merge(put_schedule::router::<S>())
        .merge(get_zone::router::<S>())
        .merge(get_alerts::router::<S>())
        .merge(health::router())
        .with_state((store, config))
}
