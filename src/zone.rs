//! Breathing-zone classification against a personal best.

use crate::models::{PefReading, Zone, ZoneReading};

// ---

/// Fraction of personal best at or above which a subject is in the good zone.
pub const GOOD_ZONE_RATIO: f64 = 0.8;

/// Fraction of personal best at or above which a subject is in the warning zone.
pub const WARNING_ZONE_RATIO: f64 = 0.5;

/// Map an average measurement and a personal best to a zone.
///
/// Missing data (no positive baseline or no positive average) classifies
/// as `Good`: there is nothing to compare against.
pub fn classify(average: f64, personal_best: f64) -> Zone {
    // ---
    if !is_positive(average) || !is_positive(personal_best) {
        return Zone::Good;
    }

    if average >= GOOD_ZONE_RATIO * personal_best {
        Zone::Good
    } else if average >= WARNING_ZONE_RATIO * personal_best {
        Zone::Warning
    } else {
        Zone::Alert
    }
}

/// Mean of the `window` most recent positive readings, 0 when there are none.
///
/// Readings may be passed in any order.
pub fn recent_average(readings: &[PefReading], window: usize) -> f64 {
    // ---
    let mut usable: Vec<&PefReading> = readings.iter().filter(|r| is_positive(r.value)).collect();
    usable.sort_by_key(|r| r.timestamp_millis);

    let recent: Vec<f64> = usable.iter().rev().take(window).map(|r| r.value).collect();
    if recent.is_empty() {
        return 0.0;
    }
    recent.iter().sum::<f64>() / recent.len() as f64
}

impl ZoneReading {
    // ---
    pub fn from_readings(readings: &[PefReading], personal_best: f64, window: usize) -> Self {
        let average_value = recent_average(readings, window);
        ZoneReading {
            zone: classify(average_value, personal_best),
            average_value,
            personal_best,
        }
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
