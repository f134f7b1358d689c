//! Wald's Sequential Probability Ratio Test for conversion rates
//!
//! H0: the treatment converts at the control rate p0.
//! H1: the treatment converts at p1 = p0 * (1 + minimum detectable effect).
//!
//! The log-likelihood ratio of the treatment's observations is compared with
//! fixed boundaries derived from the target error rates, so the test may be
//! checked after every batch of events without inflating the type-I error.

use serde::{Deserialize, Serialize};

use super::ArmCounts;
use crate::constants::{DEFAULT_SPRT_ALPHA, DEFAULT_SPRT_BETA, DEFAULT_SPRT_MDE};

/// SPRT parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SprtConfig {
    /// Relative lift over control the test is powered to detect
    pub minimum_detectable_effect: f64,
    /// Target false-positive rate
    pub alpha: f64,
    /// Target false-negative rate
    pub beta: f64,
}

impl Default for SprtConfig {
    fn default() -> Self {
        Self {
            minimum_detectable_effect: DEFAULT_SPRT_MDE,
            alpha: DEFAULT_SPRT_ALPHA,
            beta: DEFAULT_SPRT_BETA,
        }
    }
}

impl SprtConfig {
    /// `(lower, upper)` log-likelihood-ratio boundaries
    pub fn bounds(&self) -> (f64, f64) {
        let alpha = self.alpha.clamp(1e-9, 0.5);
        let beta = self.beta.clamp(1e-9, 0.5);
        let upper = ((1.0 - beta) / alpha).ln();
        let lower = (beta / (1.0 - alpha)).ln();
        (lower, upper)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequentialDecision {
    /// No meaningful difference; stop
    AcceptNull,
    /// Treatment reaches the detectable effect; stop
    AcceptAlternative,
    /// Keep collecting data
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SprtOutcome {
    pub log_likelihood_ratio: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub decision: SequentialDecision,
}

/// Run the SPRT for one treatment against its control
///
/// The control's observed rate stands in for p0. Degenerate rates (no control
/// data, p0 = 0, p1 >= 1) cannot produce a likelihood ratio and yield
/// `Continue`.
pub fn sprt(control: ArmCounts, treatment: ArmCounts, config: &SprtConfig) -> SprtOutcome {
    let (lower_bound, upper_bound) = config.bounds();
    let undecided = SprtOutcome {
        log_likelihood_ratio: 0.0,
        lower_bound,
        upper_bound,
        decision: SequentialDecision::Continue,
    };

    let p0 = control.rate();
    let p1 = p0 * (1.0 + config.minimum_detectable_effect);
    if control.trials == 0 || p0 <= 0.0 || p0 >= 1.0 || p1 <= 0.0 || p1 >= 1.0 {
        return undecided;
    }

    let successes = treatment.successes as f64;
    let failures = treatment.failures() as f64;
    let llr = successes * (p1 / p0).ln() + failures * ((1.0 - p1) / (1.0 - p0)).ln();

    let decision = if llr >= upper_bound {
        SequentialDecision::AcceptAlternative
    } else if llr <= lower_bound {
        SequentialDecision::AcceptNull
    } else {
        SequentialDecision::Continue
    };

    SprtOutcome {
        log_likelihood_ratio: llr,
        lower_bound,
        upper_bound,
        decision,
    }
}
