//! Medication adherence over a date range.
//!
//! Every calendar day in the range gets an entry, including days with no
//! activity. Per-day percentages are capped at 100; the overall figure is
//! the range's logged doses over its expected doses, not an average of the
//! daily percentages.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

use crate::error::AdherenceError;
use crate::models::{AdherenceLevel, AdherenceResult, ControllerSchedule, DailyAdherence, DoseLogEntry};

// ---

pub const GOOD_ADHERENCE_PERCENT: f64 = 80.0;
pub const FAIR_ADHERENCE_PERCENT: f64 = 50.0;

/// Longest range, in days, a single calculation may cover.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Computes expected-vs-actual dose adherence.
///
/// Dose timestamps are epoch milliseconds; `offset` decides which calendar
/// day a timestamp belongs to.
#[derive(Debug, Clone, Copy)]
pub struct AdherenceCalculator {
    // ---
    offset: FixedOffset,
}

impl Default for AdherenceCalculator {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl AdherenceCalculator {
    // ---
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Adherence for `schedule` over `[start, end]`, both days inclusive.
    ///
    /// An absent schedule is not an error: the result is 0% with one
    /// zero-valued entry per day.
    pub fn calculate(
        &self,
        schedule: Option<&ControllerSchedule>,
        logs: &[DoseLogEntry],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AdherenceResult, AdherenceError> {
        // ---
        validate_range(start, end)?;

        let actual_by_day = match schedule {
            Some(schedule) => self.count_doses(schedule.medication_name(), logs, start, end),
            None => HashMap::new(),
        };

        let mut daily = Vec::new();
        let mut expected_total = 0u32;
        let mut actual_total = 0u32;

        for date in start.iter_days().take_while(|d| *d <= end) {
            let expected = schedule.map_or(0, |s| s.expected_on(date.weekday()));
            let actual = actual_by_day.get(&date).copied().unwrap_or(0);

            expected_total += expected;
            actual_total += actual;

            daily.push(DailyAdherence {
                date,
                expected,
                actual,
                percent: capped_percent(actual, expected),
            });
        }

        Ok(AdherenceResult {
            overall_percent: ratio_percent(actual_total, expected_total),
            expected_total,
            actual_total,
            daily,
        })
    }

    /// Epoch-millisecond bounds covering `[start, end]` in this offset,
    /// used to narrow store queries to the requested window.
    pub fn window_millis(&self, start: NaiveDate, end: NaiveDate) -> (Option<i64>, Option<i64>) {
        // ---
        let first = self
            .offset
            .from_local_datetime(&start.and_time(NaiveTime::MIN))
            .single()
            .map(|dt| dt.timestamp_millis());
        let last = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
            .and_then(|t| self.offset.from_local_datetime(&end.and_time(t)).single())
            .map(|dt| dt.timestamp_millis());

        (first, last)
    }

    fn day_of(&self, timestamp_millis: i64) -> Option<NaiveDate> {
        DateTime::from_timestamp_millis(timestamp_millis)
            .map(|utc| utc.with_timezone(&self.offset).date_naive())
    }

    fn count_doses(
        &self,
        medication_name: &str,
        logs: &[DoseLogEntry],
        start: NaiveDate,
        end: NaiveDate,
    ) -> HashMap<NaiveDate, u32> {
        // ---
        let mut counts = HashMap::new();
        for entry in logs.iter().filter(|e| e.medication_name == medication_name) {
            let Some(day) = self.day_of(entry.timestamp_millis) else {
                continue;
            };
            if day < start || day > end {
                continue;
            }
            *counts.entry(day).or_insert(0) += 1;
        }
        counts
    }
}

/// Reject ranges whose start lies after their end, or that span more than
/// [`MAX_RANGE_DAYS`] days.
///
/// Together with the per-day dose bound on schedules this keeps the range
/// totals well inside `u32`.
pub fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), AdherenceError> {
    // ---
    if start > end {
        return Err(AdherenceError::InvalidRange { start, end });
    }
    let days = (end - start).num_days() + 1;
    if days > MAX_RANGE_DAYS {
        return Err(AdherenceError::RangeTooLong {
            days,
            max: MAX_RANGE_DAYS,
        });
    }
    Ok(())
}

/// Band an adherence result for display.
pub fn classify_adherence(result: &AdherenceResult) -> AdherenceLevel {
    // ---
    if result.expected_total == 0 {
        AdherenceLevel::NotScheduled
    } else if result.overall_percent >= GOOD_ADHERENCE_PERCENT {
        AdherenceLevel::Good
    } else if result.overall_percent >= FAIR_ADHERENCE_PERCENT {
        AdherenceLevel::Fair
    } else {
        AdherenceLevel::Poor
    }
}

fn capped_percent(actual: u32, expected: u32) -> f64 {
    ratio_percent(actual, expected).min(100.0)
}

fn ratio_percent(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    f64::from(numerator) / f64::from(denominator) * 100.0
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::MAX_DOSES_PER_DAY;
    use chrono::{Duration, Weekday};
    use proptest::prelude::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dose_at(date: NaiveDate, hour: u32, medication: &str) -> DoseLogEntry {
        let ts = Utc
            .from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap())
            .timestamp_millis();
        DoseLogEntry {
            timestamp_millis: ts,
            medication_name: medication.to_string(),
        }
    }

    fn albuterol_mwf() -> ControllerSchedule {
        ControllerSchedule::new(
            "Albuterol",
            1,
            [Weekday::Mon, Weekday::Wed, Weekday::Fri],
        )
        .unwrap()
    }

    fn monday() -> NaiveDate {
        day(2025, 3, 24)
    }

    #[test]
    fn test_one_dose_of_three_expected() {
        // ---
        let schedule = albuterol_mwf();
        let logs = vec![dose_at(monday(), 9, "Albuterol")];
        let result = AdherenceCalculator::default()
            .calculate(Some(&schedule), &logs, monday(), monday() + Duration::days(6))
            .unwrap();

        assert_eq!(result.daily.len(), 7);
        assert_eq!(result.expected_total, 3);
        assert_eq!(result.actual_total, 1);
        assert!((result.overall_percent - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(classify_adherence(&result), AdherenceLevel::Poor);
    }

    #[test]
    fn test_make_up_dose_is_capped() {
        // ---
        let schedule = albuterol_mwf();
        let logs = vec![
            dose_at(monday(), 8, "Albuterol"),
            dose_at(monday(), 20, "Albuterol"),
        ];
        let result = AdherenceCalculator::default()
            .calculate(Some(&schedule), &logs, monday(), monday() + Duration::days(6))
            .unwrap();

        let first = &result.daily[0];
        assert_eq!(first.actual, 2);
        assert_eq!(first.percent, 100.0);
        assert_eq!(result.actual_total, 2);
        // Only the day is capped; the range total counts both doses
        assert!((result.overall_percent - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_dose_on_inactive_weekday_counts_toward_overall() {
        // ---
        let schedule = ControllerSchedule::new("Albuterol", 1, [Weekday::Mon]).unwrap();
        let logs = vec![dose_at(monday() + Duration::days(1), 9, "Albuterol")];
        let result = AdherenceCalculator::default()
            .calculate(Some(&schedule), &logs, monday(), monday() + Duration::days(6))
            .unwrap();

        let tuesday = &result.daily[1];
        assert_eq!(tuesday.expected, 0);
        assert_eq!(tuesday.actual, 1);
        assert_eq!(tuesday.percent, 0.0);
        assert_eq!(result.daily[0].percent, 0.0);
        assert_eq!(result.expected_total, 1);
        assert_eq!(result.actual_total, 1);
        assert_eq!(result.overall_percent, 100.0);
    }

    #[test]
    fn test_overlong_range_is_rejected() {
        // ---
        let calc = AdherenceCalculator::default();
        let schedule = albuterol_mwf();
        let last_allowed = monday() + Duration::days(MAX_RANGE_DAYS - 1);

        let result = calc.calculate(Some(&schedule), &[], monday(), last_allowed).unwrap();
        assert_eq!(result.daily.len() as i64, MAX_RANGE_DAYS);

        let err = calc
            .calculate(Some(&schedule), &[], monday(), last_allowed + Duration::days(1))
            .unwrap_err();
        assert_eq!(
            err,
            AdherenceError::RangeTooLong {
                days: MAX_RANGE_DAYS + 1,
                max: MAX_RANGE_DAYS
            }
        );
    }

    #[test]
    fn test_busiest_schedule_over_longest_range() {
        // ---
        let week = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        let schedule = ControllerSchedule::new("Albuterol", MAX_DOSES_PER_DAY, week).unwrap();
        let end = monday() + Duration::days(MAX_RANGE_DAYS - 1);
        let result = AdherenceCalculator::default()
            .calculate(Some(&schedule), &[], monday(), end)
            .unwrap();

        assert_eq!(
            i64::from(result.expected_total),
            i64::from(MAX_DOSES_PER_DAY) * MAX_RANGE_DAYS
        );
        assert_eq!(result.overall_percent, 0.0);
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        // ---
        let err = AdherenceCalculator::default()
            .calculate(Some(&albuterol_mwf()), &[], monday(), monday() - Duration::days(1))
            .unwrap_err();
        assert!(matches!(err, AdherenceError::InvalidRange { .. }));
    }

    #[test]
    fn test_missing_schedule_yields_zero_days() {
        // ---
        let logs = vec![dose_at(monday(), 9, "Albuterol")];
        let result = AdherenceCalculator::default()
            .calculate(None, &logs, monday(), monday() + Duration::days(2))
            .unwrap();

        assert_eq!(result.overall_percent, 0.0);
        assert_eq!(result.daily.len(), 3);
        assert!(result
            .daily
            .iter()
            .all(|d| d.expected == 0 && d.actual == 0 && d.percent == 0.0));
        assert_eq!(classify_adherence(&result), AdherenceLevel::NotScheduled);
    }

    #[test]
    fn test_other_medications_and_out_of_range_logs_ignored() {
        // ---
        let schedule = albuterol_mwf();
        let logs = vec![
            dose_at(monday(), 9, "albuterol"),
            dose_at(monday(), 9, "Flovent"),
            dose_at(monday() - Duration::days(2), 9, "Albuterol"),
            dose_at(monday() + Duration::days(7), 9, "Albuterol"),
            dose_at(monday() + Duration::days(2), 9, "Albuterol"),
        ];
        let result = AdherenceCalculator::default()
            .calculate(Some(&schedule), &logs, monday(), monday() + Duration::days(6))
            .unwrap();

        assert_eq!(result.actual_total, 1);
        assert_eq!(result.daily[2].actual, 1);
        assert_eq!(result.daily[2].percent, 100.0);
    }

    #[test]
    fn test_offset_moves_late_doses_to_previous_day() {
        // ---
        // 02:00 UTC Tuesday is still Monday evening at UTC-5
        let schedule = albuterol_mwf();
        let logs = vec![dose_at(monday() + Duration::days(1), 2, "Albuterol")];
        let est = FixedOffset::west_opt(5 * 3600).unwrap();

        let result = AdherenceCalculator::new(est)
            .calculate(Some(&schedule), &logs, monday(), monday() + Duration::days(1))
            .unwrap();
        assert_eq!(result.daily[0].actual, 1);
        assert_eq!(result.daily[1].actual, 0);
    }

    #[test]
    fn test_full_adherence_is_good() {
        // ---
        let schedule = albuterol_mwf();
        let logs: Vec<_> = [0, 2, 4]
            .iter()
            .map(|offset| dose_at(monday() + Duration::days(*offset), 9, "Albuterol"))
            .collect();
        let result = AdherenceCalculator::default()
            .calculate(Some(&schedule), &logs, monday(), monday() + Duration::days(6))
            .unwrap();

        assert_eq!(result.overall_percent, 100.0);
        assert_eq!(classify_adherence(&result), AdherenceLevel::Good);
    }

    #[test]
    fn test_window_millis_spans_whole_days() {
        // ---
        let calc = AdherenceCalculator::default();
        let (first, last) = calc.window_millis(monday(), monday());
        let first = first.unwrap();
        let last = last.unwrap();

        assert_eq!(last - first, 24 * 3600 * 1000 - 1);
        assert_eq!(dose_at(monday(), 0, "x").timestamp_millis, first);
    }

    fn arb_logs() -> impl Strategy<Value = Vec<DoseLogEntry>> {
        // Timestamps within a few weeks around the test Monday
        let base = Utc
            .from_utc_datetime(&monday().and_hms_opt(0, 0, 0).unwrap())
            .timestamp_millis();
        let span = 40 * 24 * 3600 * 1000i64;
        proptest::collection::vec(
            (
                (base - span)..(base + span),
                prop_oneof![Just("Albuterol"), Just("Flovent")],
            )
                .prop_map(|(ts, med)| DoseLogEntry {
                    timestamp_millis: ts,
                    medication_name: med.to_string(),
                }),
            0..60,
        )
    }

    fn arb_weekdays() -> impl Strategy<Value = Vec<Weekday>> {
        let week = vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        proptest::sample::subsequence(week, 0..=7)
    }

    proptest! {
        #[test]
        fn range_has_one_entry_per_day(
            len in 0i64..60,
            times in 1u32..4,
            days in arb_weekdays(),
            logs in arb_logs(),
        ) {
            let schedule = ControllerSchedule::new("Albuterol", times, days).unwrap();
            let end = monday() + Duration::days(len);
            let result = AdherenceCalculator::default()
                .calculate(Some(&schedule), &logs, monday(), end)
                .unwrap();

            prop_assert_eq!(result.daily.len() as i64, len + 1);
            for (i, entry) in result.daily.iter().enumerate() {
                prop_assert_eq!(entry.date, monday() + Duration::days(i as i64));
            }
        }

        #[test]
        fn daily_percent_stays_within_bounds(
            len in 0i64..30,
            times in 1u32..3,
            days in arb_weekdays(),
            logs in arb_logs(),
        ) {
            let schedule = ControllerSchedule::new("Albuterol", times, days).unwrap();
            let result = AdherenceCalculator::default()
                .calculate(Some(&schedule), &logs, monday(), monday() + Duration::days(len))
                .unwrap();

            for entry in &result.daily {
                prop_assert!(entry.percent >= 0.0 && entry.percent <= 100.0);
            }
        }

        #[test]
        fn empty_weekdays_give_zero_overall(
            len in 0i64..30,
            times in 1u32..4,
            logs in arb_logs(),
        ) {
            let schedule = ControllerSchedule::new("Albuterol", times, []).unwrap();
            let result = AdherenceCalculator::default()
                .calculate(Some(&schedule), &logs, monday(), monday() + Duration::days(len))
                .unwrap();

            prop_assert_eq!(result.overall_percent, 0.0);
            prop_assert_eq!(result.expected_total, 0);
        }
    }
}
