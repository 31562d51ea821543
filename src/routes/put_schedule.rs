use axum::{
    extract::{Path, State},
    routing::put,
    Json, Router,
};
use tracing::info;

use super::{ApiError, AppState};
use crate::models::{ControllerSchedule, RawControllerSchedule};
use crate::store::{schedule_path, DocumentStore};

// ---

pub fn router<S: DocumentStore>() -> Router<AppState<S>> {
    // ---
    Router::new().route("/children/{id}/schedule", put(handler::<S>))
}

/// Replace a child's controller schedule. Schedules are not versioned; the
/// stored document is overwritten as a whole.
async fn handler<S: DocumentStore>(
    Path(subject_id): Path<String>,
    State((store, _config)): State<AppState<S>>,
    Json(raw): Json<RawControllerSchedule>,
) -> Result<Json<ControllerSchedule>, ApiError> {
    // ---
    info!("PUT /children/{}/schedule", subject_id);

    let schedule = ControllerSchedule::try_from(raw)?;
    let document = serde_json::to_value(&schedule)?;
    store.set(&schedule_path(&subject_id), document).await?;

    Ok(Json(schedule))
}
