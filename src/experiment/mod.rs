//! Experiment records, assignment, event ingestion and lifecycle.

pub mod assignment;
pub mod manager;
pub mod storage;
pub mod tracker;
pub mod types;

pub use assignment::{assign, bucket};
pub use manager::ExperimentManager;
pub use storage::{ExperimentStore, IdempotencyKey, MemoryStore, StatusChange, Transition};
pub use tracker::{EventTracker, TrackOutcome};
pub use types::{
    AuditNote, CounterDelta, Event, EventType, Experiment, ExperimentStatus, ExperimentSummary,
    NewExperiment, NewExperimentBuilder, NewVariant, TrackEvent, Variant, VariantCounters,
    WinnerStrategy,
};
