use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use super::{ApiError, AppState};
use crate::alerts::AlertAggregator;
use crate::models::{AlertSignal, SubjectId};
use crate::store::{fetch_children, fetch_status, DocumentStore};

// ---

pub fn router<S: DocumentStore>() -> Router<AppState<S>> {
    // ---
    Router::new()
        .route("/parents/{id}/alerts", get(has_alert::<S>))
        .route("/parents/{id}/alerts/signals", get(signals::<S>))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertStateResponse {
    parent_id: String,
    child_count: usize,
    has_alert: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignalsResponse {
    parent_id: String,
    signals: Vec<AlertSignal>,
}

/// Handle `GET /parents/{id}/alerts`: one boolean for the parent's badge.
async fn has_alert<S: DocumentStore>(
    Path(parent_id): Path<String>,
    State((store, config)): State<AppState<S>>,
) -> Result<Json<AlertStateResponse>, ApiError> {
    // ---
    info!("GET /parents/{}/alerts", parent_id);

    let children = fetch_children(&store, &parent_id).await?;
    let child_count = children.len();

    let state = AlertAggregator::new(config.fetch_timeout)
        .evaluate(children, |id: &SubjectId| {
            let store = store.clone();
            let id = id.clone();
            async move { fetch_status(&store, &id).await }
        })
        .await;

    Ok(Json(AlertStateResponse {
        parent_id,
        child_count,
        has_alert: state.has_alert(),
    }))
}

/// Handle `GET /parents/{id}/alerts/signals`: every signal, for the
/// notification list.
async fn signals<S: DocumentStore>(
    Path(parent_id): Path<String>,
    State((store, config)): State<AppState<S>>,
) -> Result<Json<SignalsResponse>, ApiError> {
    // ---
    info!("GET /parents/{}/alerts/signals", parent_id);

    let children = fetch_children(&store, &parent_id).await?;
    let signals = AlertAggregator::new(config.fetch_timeout)
        .collect_signals(children, |id: &SubjectId| {
            let store = store.clone();
            let id = id.clone();
            async move { fetch_status(&store, &id).await }
        })
        .await;

    Ok(Json(SignalsResponse { parent_id, signals }))
}
