//! Nickname synchronization engine.
//!
//! [`Reconciler`] moves a single member between the marked and unmarked
//! states; [`Scheduler`] runs it over every member of every guild on a
//! fixed interval.

mod marker;
mod reconciler;
mod scheduler;

pub use marker::{DEFAULT_MARKER, MAX_MARKER_CHARS, MAX_NICKNAME_CHARS, Marker};
pub use reconciler::{
    ReconcileOutcome, Reconciler, ReconcilerConfig, Transition, plan_transition,
};
pub use scheduler::{PassSummary, Scheduler, SchedulerConfig};
