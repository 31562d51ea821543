use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info};

use super::{ApiError, AppState};
use crate::models::ZoneReading;
use crate::store::{fetch_pef_log, fetch_status, pef_zone_path, DocumentStore, QueryRange};

// ---

pub fn router<S: DocumentStore>() -> Router<AppState<S>> {
    // ---
    Router::new().route("/children/{id}/zone", get(handler::<S>))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ZoneResponse {
    // ---
    subject_id: String,
    zone_code: i64,
    #[serde(flatten)]
    reading: ZoneReading,
}

async fn handler<S: DocumentStore>(
    Path(subject_id): Path<String>,
    State((store, config)): State<AppState<S>>,
) -> Result<Json<ZoneResponse>, ApiError> {
    // ---
    info!("GET /children/{}/zone", subject_id);

    // Step 1: Read baseline and measurements
    let (status, readings) = tokio::join!(
        fetch_status(&store, &subject_id),
        fetch_pef_log(&store, &subject_id, QueryRange::default()),
    );
    let personal_best = status?.and_then(|doc| doc.personal_best).unwrap_or(0.0);
    let readings = readings?;

    // Step 2: Classify
    let reading = ZoneReading::from_readings(&readings, personal_best, config.pef_average_window);
    debug!(
        "Zone {:?} from {} readings (average {:.1}, personal best {:.1})",
        reading.zone,
        readings.len(),
        reading.average_value,
        personal_best
    );

    // Step 3: Persist the zone so other views see it; a failed write still
    // returns the freshly computed zone
    let mut patch = BTreeMap::new();
    patch.insert(pef_zone_path(&subject_id), json!(reading.zone.code()));
    if let Err(e) = store.update(patch).await {
        error!("Failed to persist zone for {}: {}", subject_id, e);
    }

    Ok(Json(ZoneResponse {
        subject_id,
        zone_code: reading.zone.code(),
        reading,
    }))
}
