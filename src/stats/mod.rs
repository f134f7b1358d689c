//! Statistical library
//!
//! Pure, stateless functions over raw counts. Nothing here touches experiment
//! state, so every function may be called concurrently without coordination.
//!
//! - [`wilson`]: Wilson score intervals and Newcombe lift intervals
//! - [`bayesian`]: Beta-Binomial posteriors via Monte Carlo
//! - [`sequential`]: Wald's sequential probability ratio test
//! - [`anova`]: one-way ANOVA gate for three or more variants
//! - [`power`]: sample size estimation and sample ratio mismatch checks
//!
//! Degenerate input (zero trials, zero variance) never errors: it yields wide
//! intervals, p-values of 1, or a `Continue` decision.

pub mod anova;
pub mod bayesian;
pub mod distributions;
pub mod power;
pub mod sequential;
pub mod wilson;

use serde::{Deserialize, Serialize};

pub use anova::{one_way_anova, AnovaResult};
pub use bayesian::{bayesian_analysis, BayesianArm, BayesianSummary};
pub use power::{required_sample_size, sample_ratio_mismatch, SampleRatioCheck};
pub use sequential::{sprt, SequentialDecision, SprtConfig, SprtOutcome};
pub use wilson::{lift_interval, wilson_interval, Interval, LiftEstimate};

/// Binomial counts for one arm of an experiment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmCounts {
    /// Exposures (impressions)
    pub trials: u64,
    /// Successes (conversions), never more than `trials`
    pub successes: u64,
}

impl ArmCounts {
    /// Build counts, clamping successes to trials
    pub fn new(trials: u64, successes: u64) -> Self {
        Self {
            trials,
            successes: successes.min(trials),
        }
    }

    /// Observed success rate, 0 when there are no trials
    pub fn rate(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.successes as f64 / self.trials as f64
        }
    }

    pub fn failures(&self) -> u64 {
        self.trials - self.successes.min(self.trials)
    }
}
