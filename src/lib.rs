//! Experimentation Engine Library
//!
//! A/B/n testing for content variants: deterministic traffic assignment,
//! idempotent event tracking, significance testing and winner selection.
//!
//! # Key Features
//! - Stable hash bucketing (SHA-256, 10,000 buckets)
//! - Wilson score intervals with Newcombe lift intervals
//! - Optional Bayesian (Beta-Binomial) and sequential (SPRT) annotations
//! - One-way ANOVA gate for experiments with three or more variants
//! - Strategy-driven winner selection (immediate, conservative, economic, safety-first)
//!
//! # Storage
//! - All persistence goes through the `ExperimentStore` trait
//! - Counter increments are atomic; status changes are conditional
//! - `MemoryStore` ships in-process for embedding and tests

pub mod adapters;
pub mod analysis;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod experiment;
pub mod metrics;
pub mod selection;
pub mod stats;
pub mod tracing_setup;
pub mod validation;

pub use analysis::{AnalysisOptions, ExperimentResult, RecommendedAction, VariantResult};
pub use config::EngineConfig;
pub use engine::ExperimentEngine;
pub use errors::{EngineError, Result, StoreError};
pub use experiment::{
    Event, EventType, Experiment, ExperimentStatus, ExperimentStore, MemoryStore, NewExperiment,
    NewVariant, TrackEvent, TrackOutcome, Variant, VariantCounters, WinnerStrategy,
};
pub use selection::{Evaluation, SelectionPhase};

// Re-export dependencies to ensure tests/benchmarks use the same version
pub use chrono;
pub use parking_lot;
pub use uuid;
