//! Documented constants for the experimentation engine
//!
//! This module contains the tunable defaults with the reasoning behind their
//! values. Centralizing constants prevents magic numbers in the statistics
//! and selection code.

// =============================================================================
// EXPERIMENT DEFAULTS
// =============================================================================

/// Default confidence level for significance decisions (95%)
///
/// Stored as confidence, not alpha: an experiment configured with 0.95
/// tests at alpha = 0.05.
pub const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.95;

/// Default minimum impressions per variant before any winner may be declared
///
/// 100 matches the smallest sample at which the Wilson interval's coverage
/// stays close to nominal for conversion rates in the 1-20% range.
pub const DEFAULT_MIN_SAMPLE_SIZE: u64 = 100;

/// Traffic splits are integer percentages and must sum to exactly this value
pub const TOTAL_SPLIT_PERCENT: u32 = 100;

/// Bucketing resolution: hashed units fall into [0, BUCKET_RESOLUTION)
///
/// 10,000 buckets gives 0.01 percentage-point granularity over [0, 100).
pub const BUCKET_RESOLUTION: u64 = 10_000;

// =============================================================================
// STRATEGY THRESHOLDS
// =============================================================================

/// Conservative strategy: significance must hold until samples reach this
/// multiple of the minimum sample size, and for the excess over 1.0 times
/// the minimum sample after the first crossing.
pub const CONSERVATIVE_CONFIRMATION_MULTIPLIER: f64 = 1.5;

/// Safety-first strategy: required sample size multiplier
pub const SAFETY_FIRST_SAMPLE_MULTIPLIER: f64 = 2.0;

/// Safety-first strategy: minimum confidence, overriding lower configured levels
pub const SAFETY_FIRST_CONFIDENCE: f64 = 0.99;

// =============================================================================
// BAYESIAN ANALYSIS
// =============================================================================

/// Default Monte Carlo draws for posterior comparisons
///
/// At 10,000 draws the standard error of a win probability is at most 0.5pp.
pub const DEFAULT_MONTE_CARLO_DRAWS: usize = 10_000;

/// Lower clamp on Monte Carlo draws
pub const MIN_MONTE_CARLO_DRAWS: usize = 1_000;

/// Hard cap on Monte Carlo draws, guarantees bounded work per analysis
pub const MAX_MONTE_CARLO_DRAWS: usize = 1_000_000;

/// Default seed so repeated analyses of identical counts agree
pub const DEFAULT_MONTE_CARLO_SEED: u64 = 0x5eed_ab7e_57;

/// Credible interval percentiles (95%)
pub const CREDIBLE_INTERVAL_LOW: f64 = 0.025;
pub const CREDIBLE_INTERVAL_HIGH: f64 = 0.975;

// =============================================================================
// SEQUENTIAL TESTING (SPRT)
// =============================================================================

/// Default false-positive rate target
pub const DEFAULT_SPRT_ALPHA: f64 = 0.05;

/// Default false-negative rate target (80% power)
pub const DEFAULT_SPRT_BETA: f64 = 0.20;

/// Default minimum detectable effect, relative to the control rate (+20%)
pub const DEFAULT_SPRT_MDE: f64 = 0.20;

// =============================================================================
// DATA QUALITY
// =============================================================================

/// p-value below which a sample ratio mismatch is reported
///
/// SRM is checked on every analysis, so 0.05 would flag healthy experiments.
pub const SRM_P_VALUE_THRESHOLD: f64 = 0.001;

/// Statistical power targeted when estimating remaining sample size
pub const TARGET_POWER: f64 = 0.8;

// =============================================================================
// EVENT INGESTION
// =============================================================================

/// Attempts for a counter increment before giving up on transient errors
pub const DEFAULT_TRACK_RETRY_ATTEMPTS: u32 = 3;

/// Base backoff between increment attempts, doubled per retry
pub const DEFAULT_TRACK_RETRY_BASE_DELAY_MS: u64 = 5;

// =============================================================================
// INPUT LIMITS
// =============================================================================

pub const MAX_NAME_LENGTH: usize = 256;
pub const MAX_HYPOTHESIS_LENGTH: usize = 4_096;
pub const MAX_VISITOR_ID_LENGTH: usize = 256;
pub const MAX_VARIANTS: usize = 26;
