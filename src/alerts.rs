//! Cross-subject alert evaluation.
//!
//! A parent's view needs one answer: does any monitored child need
//! attention right now? Each child's status is fetched independently and
//! completions arrive in any order, some of them failing. The aggregator
//! fans the fetches out as separate tasks and folds completions one at a
//! time in the calling task, so the bookkeeping is never shared between
//! threads.
//!
//! The fold itself lives in [`AlertJoin`], which resolves exactly once:
//! early with `AlertPresent` as soon as one subject reports an alert, or
//! with `NoAlert` once every fetch has completed or failed.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::error::FetchFailure;
use crate::models::{
    AggregateAlertState, AlertKind, AlertSignal, InventoryStatus, StatusDocument, SubjectId, Zone,
};

// ---

/// Default bound on a single status fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Signals raised by one status document, in document order.
pub fn alert_signals(document: &StatusDocument, detected_at: DateTime<Utc>) -> Vec<AlertSignal> {
    // ---
    let mut signals = Vec::new();
    let signal = |kind, medicine: Option<&str>| AlertSignal {
        kind,
        subject_name: document.name.clone(),
        medicine: medicine.map(String::from),
        detected_at,
    };

    if document.pef_zone == Some(Zone::Alert) {
        signals.push(signal(AlertKind::PefSafety, None));
    }

    for medicine in &document.inventory {
        if medicine.statuses.contains(&InventoryStatus::Low) {
            signals.push(signal(AlertKind::MedicineLow, Some(medicine.name.as_str())));
        }
        if medicine.statuses.contains(&InventoryStatus::Expired) {
            signals.push(signal(AlertKind::MedicineExpired, Some(medicine.name.as_str())));
        }
    }

    signals
}

/// True when the document carries a red PEF zone or any low/expired medicine.
/// An absent document has no alert.
pub fn status_has_alert(document: Option<&StatusDocument>) -> bool {
    // ---
    let Some(document) = document else {
        return false;
    };

    document.pef_zone == Some(Zone::Alert)
        || document.inventory.iter().any(|medicine| {
            medicine
                .statuses
                .iter()
                .any(|s| matches!(s, InventoryStatus::Low | InventoryStatus::Expired))
        })
}

/// How one subject's fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Alert,
    Clear,
    Failed,
}

/// Fan-in bookkeeping for one evaluation.
#[derive(Debug, Clone)]
pub struct AlertJoin {
    // ---
    total: usize,
    completed: usize,
    found: bool,
    resolved: bool,
}

impl AlertJoin {
    // ---
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            found: false,
            resolved: false,
        }
    }

    /// Resolve a join that has nothing to wait for.
    pub fn begin(&mut self) -> Option<AggregateAlertState> {
        if self.total == 0 {
            return self.resolve(AggregateAlertState::NoAlert);
        }
        None
    }

    /// Fold one completion. Returns the resolution the first (and only)
    /// time one is reached.
    pub fn record(&mut self, completion: Completion) -> Option<AggregateAlertState> {
        // ---
        if self.completed >= self.total {
            return None;
        }

        let mut resolution = None;
        if completion == Completion::Alert && !self.found {
            self.found = true;
            resolution = self.resolve(AggregateAlertState::AlertPresent);
        }

        self.completed += 1;
        if self.completed == self.total && !self.found {
            resolution = self.resolve(AggregateAlertState::NoAlert);
        }
        resolution
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    fn resolve(&mut self, state: AggregateAlertState) -> Option<AggregateAlertState> {
        if self.resolved {
            return None;
        }
        self.resolved = true;
        Some(state)
    }
}

type FetchOutcome = (SubjectId, Result<Option<StatusDocument>, FetchFailure>);

/// Fans status fetches out over many subjects and joins the answers.
///
/// Dropping a returned future aborts every fetch still in flight; their
/// results are never looked at.
#[derive(Debug, Clone, Copy)]
pub struct AlertAggregator {
    // ---
    fetch_timeout: Duration,
}

impl Default for AlertAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl AlertAggregator {
    // ---
    pub fn new(fetch_timeout: Duration) -> Self {
        Self { fetch_timeout }
    }

    /// Does any of `subjects` currently have an alert?
    ///
    /// Resolves as soon as one subject reports an alert, otherwise once
    /// every fetch has finished. A failed or timed-out fetch counts as "no
    /// alert from this subject" and never fails the evaluation.
    pub async fn evaluate<I, F, Fut, E>(&self, subjects: I, fetch_status: F) -> AggregateAlertState
    where
        I: IntoIterator<Item = SubjectId>,
        F: Fn(&SubjectId) -> Fut,
        Fut: Future<Output = Result<Option<StatusDocument>, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        // ---
        let subjects: BTreeSet<SubjectId> = subjects.into_iter().collect();
        let span = tracing::info_span!(
            "alert_evaluation",
            evaluation_id = %Uuid::new_v4(),
            subjects = subjects.len()
        );

        async move {
            let mut join = AlertJoin::new(subjects.len());
            if let Some(state) = join.begin() {
                debug!("No subjects to evaluate");
                return state;
            }

            let mut tasks = self.spawn_fetches(subjects, &fetch_status);
            while let Some(joined) = tasks.join_next().await {
                let completion = match settle(joined) {
                    (subject, Ok(document)) if status_has_alert(document.as_ref()) => {
                        debug!("Subject {} has an alert", subject);
                        Completion::Alert
                    }
                    (_, Ok(_)) => Completion::Clear,
                    (subject, Err(failure)) => {
                        warn!("No status for subject {}: {}", subject, failure);
                        Completion::Failed
                    }
                };

                if let Some(state) = join.record(completion) {
                    info!(
                        "Alert evaluation resolved to {:?} after {} completions",
                        state,
                        join.completed()
                    );
                    // Remaining fetches are aborted when `tasks` drops
                    return state;
                }
            }

            // Every spawned task yields exactly one join result, so the join
            // has resolved before the set runs dry.
            AggregateAlertState::NoAlert
        }
        .instrument(span)
        .await
    }

    /// Every alert signal across `subjects`, waiting for all fetches.
    ///
    /// Signals are ordered by subject name, then kind. Failed fetches
    /// contribute nothing.
    pub async fn collect_signals<I, F, Fut, E>(&self, subjects: I, fetch_status: F) -> Vec<AlertSignal>
    where
        I: IntoIterator<Item = SubjectId>,
        F: Fn(&SubjectId) -> Fut,
        Fut: Future<Output = Result<Option<StatusDocument>, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        // ---
        let subjects: BTreeSet<SubjectId> = subjects.into_iter().collect();
        let span = tracing::info_span!(
            "alert_signals",
            evaluation_id = %Uuid::new_v4(),
            subjects = subjects.len()
        );

        async move {
            let mut signals = Vec::new();
            if subjects.is_empty() {
                return signals;
            }

            let mut tasks = self.spawn_fetches(subjects, &fetch_status);
            while let Some(joined) = tasks.join_next().await {
                match settle(joined) {
                    (_, Ok(Some(document))) => {
                        signals.extend(alert_signals(&document, Utc::now()));
                    }
                    (_, Ok(None)) => {}
                    (subject, Err(failure)) => {
                        warn!("No status for subject {}: {}", subject, failure);
                    }
                }
            }

            signals.sort_by(|a, b| {
                a.subject_name
                    .cmp(&b.subject_name)
                    .then(a.kind.cmp(&b.kind))
                    .then(a.medicine.cmp(&b.medicine))
            });
            info!("Collected {} alert signals", signals.len());
            signals
        }
        .instrument(span)
        .await
    }

    fn spawn_fetches<F, Fut, E>(
        &self,
        subjects: BTreeSet<SubjectId>,
        fetch_status: &F,
    ) -> JoinSet<FetchOutcome>
    where
        F: Fn(&SubjectId) -> Fut,
        Fut: Future<Output = Result<Option<StatusDocument>, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        // ---
        let mut tasks = JoinSet::new();
        for subject in subjects {
            let fetch = fetch_status(&subject);
            let limit = self.fetch_timeout;

            tasks.spawn(async move {
                let outcome = match tokio::time::timeout(limit, fetch).await {
                    Ok(Ok(document)) => Ok(document),
                    Ok(Err(e)) => Err(FetchFailure::Source(e.to_string())),
                    Err(_) => Err(FetchFailure::Timeout(limit)),
                };
                (subject, outcome)
            });
        }
        tasks
    }
}

fn settle(joined: Result<FetchOutcome, JoinError>) -> FetchOutcome {
    joined.unwrap_or_else(|e| ("<unknown>".to_string(), Err(FetchFailure::Aborted(e.to_string()))))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::MedicineInventory;
    use proptest::prelude::*;

    use crate::models::InventoryStatus::{Expired, Low, Ok as Stocked};

    fn doc(name: &str, zone: Option<Zone>, inventory: Vec<(&str, Vec<InventoryStatus>)>) -> StatusDocument {
        StatusDocument {
            name: name.to_string(),
            pef_zone: zone,
            personal_best: None,
            inventory: inventory
                .into_iter()
                .map(|(med, statuses)| MedicineInventory {
                    name: med.to_string(),
                    statuses,
                })
                .collect(),
        }
    }

    #[test]
    fn test_status_predicate() {
        // ---
        assert!(!status_has_alert(None));
        assert!(!status_has_alert(Some(&doc("a", Some(Zone::Warning), vec![]))));
        assert!(status_has_alert(Some(&doc("a", Some(Zone::Alert), vec![]))));
        assert!(status_has_alert(Some(&doc(
            "a",
            None,
            vec![("Albuterol", vec![Stocked, Low])]
        ))));
        assert!(status_has_alert(Some(&doc(
            "a",
            Some(Zone::Good),
            vec![("Flovent", vec![Expired])]
        ))));
        assert!(!status_has_alert(Some(&doc(
            "a",
            Some(Zone::Good),
            vec![("Flovent", vec![Stocked])]
        ))));
    }

    #[test]
    fn test_signals_per_document() {
        // ---
        let now = Utc::now();
        let document = doc(
            "Maya",
            Some(Zone::Alert),
            vec![("Albuterol", vec![Low, Expired]), ("Flovent", vec![Stocked])],
        );
        let signals = alert_signals(&document, now);

        let kinds: Vec<AlertKind> = signals.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![AlertKind::PefSafety, AlertKind::MedicineLow, AlertKind::MedicineExpired]
        );
        assert!(signals.iter().all(|s| s.subject_name == "Maya" && s.detected_at == now));
        assert_eq!(signals[1].medicine.as_deref(), Some("Albuterol"));
        assert_eq!(signals[0].medicine, None);
    }

    #[test]
    fn test_predicate_matches_signals() {
        // ---
        let quiet = doc("a", Some(Zone::Warning), vec![("Flovent", vec![Stocked])]);
        assert!(alert_signals(&quiet, Utc::now()).is_empty());
        assert!(!status_has_alert(Some(&quiet)));
    }

    #[test]
    fn test_empty_join_resolves_immediately() {
        // ---
        let mut join = AlertJoin::new(0);
        assert_eq!(join.begin(), Some(AggregateAlertState::NoAlert));
        assert_eq!(join.record(Completion::Alert), None);
    }

    #[test]
    fn test_late_alert_after_clear_and_failure() {
        // ---
        let mut join = AlertJoin::new(3);
        assert_eq!(join.begin(), None);
        assert_eq!(join.record(Completion::Clear), None);
        assert_eq!(join.record(Completion::Failed), None);
        assert_eq!(
            join.record(Completion::Alert),
            Some(AggregateAlertState::AlertPresent)
        );
        assert!(join.is_resolved());
    }

    #[test]
    fn test_early_alert_resolves_once() {
        // ---
        let mut join = AlertJoin::new(3);
        assert_eq!(
            join.record(Completion::Alert),
            Some(AggregateAlertState::AlertPresent)
        );
        assert_eq!(join.record(Completion::Alert), None);
        assert_eq!(join.record(Completion::Clear), None);
        assert_eq!(join.record(Completion::Clear), None);
        assert_eq!(join.completed(), 3);
    }

    #[test]
    fn test_all_failures_resolve_to_no_alert() {
        // ---
        let mut join = AlertJoin::new(2);
        assert_eq!(join.record(Completion::Failed), None);
        assert_eq!(
            join.record(Completion::Failed),
            Some(AggregateAlertState::NoAlert)
        );
    }

    fn arb_completion() -> impl Strategy<Value = Completion> {
        prop_oneof![
            Just(Completion::Alert),
            Just(Completion::Clear),
            Just(Completion::Failed),
        ]
    }

    fn run_join(completions: &[Completion]) -> Vec<AggregateAlertState> {
        let mut join = AlertJoin::new(completions.len());
        let mut emitted: Vec<_> = join.begin().into_iter().collect();
        for completion in completions {
            emitted.extend(join.record(*completion));
        }
        emitted
    }

    proptest! {
        #[test]
        fn join_resolves_once_in_any_order(
            (original, shuffled) in proptest::collection::vec(arb_completion(), 0..16)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            let expected = if original.contains(&Completion::Alert) {
                AggregateAlertState::AlertPresent
            } else {
                AggregateAlertState::NoAlert
            };

            for order in [&original, &shuffled] {
                let emitted = run_join(order);
                prop_assert_eq!(emitted, vec![expected]);
            }
        }
    }
}
