//! Error taxonomy for the status engine.
//!
//! Pure calculators only fail on caller contract violations. Store and
//! fetch errors are kept separate so the aggregator can swallow a single
//! subject's failure without touching the others.

use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

/// Failure of the adherence calculator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdherenceError {
    #[error("invalid range: start day {start} is after end day {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("range of {days} days exceeds the maximum of {max}")]
    RangeTooLong { days: i64, max: i64 },
}

/// A controller schedule that breaks its own invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("timesPerDay must be at least 1")]
    NoDosesPerDay,

    #[error("timesPerDay must be at most {max}, got {got}")]
    TooManyDosesPerDay { got: u32, max: u32 },

    #[error("medicationName must not be empty")]
    EmptyMedicationName,
}

/// Failure talking to the remote document store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store returned HTTP {status} for '{path}'")]
    Status { path: String, status: u16 },

    #[error("store document at '{path}' could not be decoded: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Why one subject's status fetch produced no document.
///
/// Never surfaced to callers of the aggregator; logged and counted as
/// "no signal from this subject".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("status fetch failed: {0}")]
    Source(String),

    #[error("status fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("status fetch task aborted: {0}")]
    Aborted(String),
}
