use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ApiError, AppState};
use crate::adherence::{classify_adherence, validate_range, AdherenceCalculator};
use crate::models::{AdherenceLevel, AdherenceResult};
use crate::store::{fetch_dose_log, fetch_schedule, DocumentStore, QueryRange};

// ---

pub fn router<S: DocumentStore>() -> Router<AppState<S>> {
    // ---
    Router::new().route("/children/{id}/adherence", get(handler::<S>))
}

/// Query parameters: an inclusive day range, e.g. `?start=2025-03-24&end=2025-03-30`
#[derive(Debug, Deserialize)]
pub struct AdherenceQuery {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdherenceResponse {
    // ---
    subject_id: String,
    medication_name: Option<String>,
    level: AdherenceLevel,
    label: &'static str,
    #[serde(flatten)]
    result: AdherenceResult,
}

async fn handler<S: DocumentStore>(
    Path(subject_id): Path<String>,
    Query(params): Query<AdherenceQuery>,
    State((store, config)): State<AppState<S>>,
) -> Result<Json<AdherenceResponse>, ApiError> {
    // ---
    info!("GET /children/{}/adherence {:?}", subject_id, params);
    validate_range(params.start, params.end)?;

    let calculator = AdherenceCalculator::new(config.utc_offset);
    let (start_at, end_at) = calculator.window_millis(params.start, params.end);
    let window = QueryRange { start_at, end_at };

    let (schedule, logs) = tokio::join!(
        fetch_schedule(&store, &subject_id),
        fetch_dose_log(&store, &subject_id, window),
    );
    let schedule = schedule?;
    let logs = logs?;
    debug!(
        "Schedule configured: {}, {} dose entries in window",
        schedule.is_some(),
        logs.len()
    );

    let result = calculator.calculate(schedule.as_ref(), &logs, params.start, params.end)?;
    let level = classify_adherence(&result);

    Ok(Json(AdherenceResponse {
        subject_id,
        medication_name: schedule.map(|s| s.medication_name().to_string()),
        level,
        label: level.label(),
        result,
    }))
}
