//! Clinical status and adherence engine for the asthma care backend.
//!
//! Three computations turn raw, asynchronously fetched records into the
//! signals the apps display:
//! - [`adherence`] – expected vs. logged controller doses over a date range
//! - [`zone`] – breathing zone of an average PEF against a personal best
//! - [`alerts`] – whether any of a parent's children needs attention, joined
//!   over independent per-child fetches
//!
//! The calculators are pure. Everything that touches the remote document
//! store goes through [`store`], and [`routes`] exposes the results over
//! HTTP. Module boundaries follow the Explicit Module Boundary Pattern
//! (EMBP): siblings reach shared types through this crate root.

pub mod adherence;
pub mod alerts;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod store;
pub mod zone;

pub use config::Config;

// Re-exported so routes and integration tests import from one place
pub use adherence::AdherenceCalculator;
pub use alerts::AlertAggregator;
pub use error::{AdherenceError, FetchFailure, ScheduleError, StoreError};
pub use models::{
    AdherenceResult, AggregateAlertState, AlertKind, AlertSignal, ControllerSchedule,
    DailyAdherence, DoseLogEntry, StatusDocument, SubjectId, Zone, ZoneReading,
};
pub use store::{DocumentStore, HttpDocumentStore, MemoryStore, QueryRange};
