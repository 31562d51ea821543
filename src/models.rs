//! Value types for the status engine.
//!
//! Store documents arrive as untyped JSON; the `Raw*` types mirror that
//! shape and are converted into typed values at the boundary, so the
//! calculators never look at a raw map.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

// ---

/// Store key of a monitored child profile.
pub type SubjectId = String;

/// Upper bound on scheduled doses per day.
pub const MAX_DOSES_PER_DAY: u32 = 24;

/// Recurring dose plan for one controller medication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawControllerSchedule", into = "RawControllerSchedule")]
pub struct ControllerSchedule {
    // ---
    medication_name: String,
    times_per_day: u32,
    active_weekdays: HashSet<Weekday>,
}

/// Schedule as stored: weekdays are a list of names such as `"Mon"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawControllerSchedule {
    // ---
    pub medication_name: String,
    pub times_per_day: u32,
    #[serde(default)]
    pub active_weekdays: Vec<Weekday>,
}

impl ControllerSchedule {
    // ---
    pub fn new(
        medication_name: impl Into<String>,
        times_per_day: u32,
        active_weekdays: impl IntoIterator<Item = Weekday>,
    ) -> Result<Self, ScheduleError> {
        // ---
        let medication_name = medication_name.into();
        if medication_name.trim().is_empty() {
            return Err(ScheduleError::EmptyMedicationName);
        }
        if times_per_day == 0 {
            return Err(ScheduleError::NoDosesPerDay);
        }
        if times_per_day > MAX_DOSES_PER_DAY {
            return Err(ScheduleError::TooManyDosesPerDay {
                got: times_per_day,
                max: MAX_DOSES_PER_DAY,
            });
        }

        Ok(Self {
            medication_name,
            times_per_day,
            active_weekdays: active_weekdays.into_iter().collect(),
        })
    }

    pub fn medication_name(&self) -> &str {
        &self.medication_name
    }

    pub fn times_per_day(&self) -> u32 {
        self.times_per_day
    }

    pub fn is_active_on(&self, weekday: Weekday) -> bool {
        self.active_weekdays.contains(&weekday)
    }

    /// Doses expected on a day falling on `weekday`.
    pub fn expected_on(&self, weekday: Weekday) -> u32 {
        if self.is_active_on(weekday) {
            self.times_per_day
        } else {
            0
        }
    }
}

impl TryFrom<RawControllerSchedule> for ControllerSchedule {
    type Error = ScheduleError;

    fn try_from(raw: RawControllerSchedule) -> Result<Self, Self::Error> {
        ControllerSchedule::new(raw.medication_name, raw.times_per_day, raw.active_weekdays)
    }
}

impl From<ControllerSchedule> for RawControllerSchedule {
    fn from(schedule: ControllerSchedule) -> Self {
        // ---
        let mut active_weekdays: Vec<Weekday> = schedule.active_weekdays.into_iter().collect();
        active_weekdays.sort_by_key(|d| d.num_days_from_monday());

        RawControllerSchedule {
            medication_name: schedule.medication_name,
            times_per_day: schedule.times_per_day,
            active_weekdays,
        }
    }
}

/// One recorded dose. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseLogEntry {
    // ---
    pub timestamp_millis: i64,
    pub medication_name: String,
}

/// Expected vs. actual doses for a single calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAdherence {
    // ---
    pub date: NaiveDate,
    pub expected: u32,
    pub actual: u32,
    pub percent: f64,
}

/// Adherence over a date range, one `DailyAdherence` per day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceResult {
    // ---
    pub overall_percent: f64,
    pub expected_total: u32,
    pub actual_total: u32,
    pub daily: Vec<DailyAdherence>,
}

/// Coarse adherence band shown next to the percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdherenceLevel {
    NotScheduled,
    Good,
    Fair,
    Poor,
}

impl AdherenceLevel {
    pub fn label(self) -> &'static str {
        match self {
            AdherenceLevel::NotScheduled => "No doses scheduled",
            AdherenceLevel::Good => "Good adherence",
            AdherenceLevel::Fair => "Fair adherence",
            AdherenceLevel::Poor => "Poor adherence",
        }
    }
}

/// Breathing zone. Ordered by severity: `Good < Warning < Alert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Zone {
    Good,
    Warning,
    Alert,
}

impl Zone {
    /// Integer code used when the zone is persisted to the store.
    pub fn code(self) -> i64 {
        match self {
            Zone::Good => 0,
            Zone::Warning => 1,
            Zone::Alert => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Zone> {
        match code {
            0 => Some(Zone::Good),
            1 => Some(Zone::Warning),
            2 => Some(Zone::Alert),
            _ => None,
        }
    }
}

/// One peak-expiratory-flow measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PefReading {
    // ---
    pub timestamp_millis: i64,
    pub value: f64,
}

/// Current zone of a subject together with the inputs that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneReading {
    // ---
    pub zone: Zone,
    pub average_value: f64,
    pub personal_best: f64,
}

/// Inventory status code of a medicine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryStatus {
    Ok,
    Low,
    Expired,
}

impl InventoryStatus {
    pub fn from_code(code: i64) -> Option<InventoryStatus> {
        match code {
            0 => Some(InventoryStatus::Ok),
            1 => Some(InventoryStatus::Low),
            2 => Some(InventoryStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicineInventory {
    // ---
    pub name: String,
    pub statuses: Vec<InventoryStatus>,
}

/// Typed view of a child's status document.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusDocument {
    // ---
    pub name: String,
    pub pef_zone: Option<Zone>,
    pub personal_best: Option<f64>,
    pub inventory: Vec<MedicineInventory>,
}

/// Status document as stored under `children/{id}`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStatusDocument {
    // ---
    pub name: Option<String>,
    pub pef_zone: Option<i64>,
    pub personal_best: Option<f64>,
    #[serde(default)]
    pub inventory: BTreeMap<String, Vec<i64>>,
}

impl RawStatusDocument {
    // ---
    /// Decode into a `StatusDocument`. The subject id stands in for a
    /// missing name; unknown zone or inventory codes are dropped.
    pub fn into_status(self, subject_id: &str) -> StatusDocument {
        // ---
        let inventory = self
            .inventory
            .into_iter()
            .map(|(name, codes)| MedicineInventory {
                name,
                statuses: codes
                    .into_iter()
                    .filter_map(InventoryStatus::from_code)
                    .collect(),
            })
            .collect();

        StatusDocument {
            name: self
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| subject_id.to_string()),
            pef_zone: self.pef_zone.and_then(Zone::from_code),
            personal_best: self.personal_best,
            inventory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AlertKind {
    MedicineLow,
    MedicineExpired,
    PefSafety,
}

/// One reason a subject needs attention. Recomputed on every pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSignal {
    // ---
    pub kind: AlertKind,
    pub subject_name: String,
    /// Medicine the signal refers to, for inventory signals.
    pub medicine: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// Final answer of an aggregate alert evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateAlertState {
    AlertPresent,
    NoAlert,
}

impl AggregateAlertState {
    pub fn has_alert(self) -> bool {
        matches!(self, AggregateAlertState::AlertPresent)
    }
}
