//! Wilson score intervals for proportions and Newcombe's hybrid score
//! interval for the difference between a treatment and its control.

use serde::{Deserialize, Serialize};

use super::distributions::z_for_confidence;
use super::ArmCounts;

/// Closed interval `[lower, upper]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub fn excludes_zero(&self) -> bool {
        !self.contains(0.0)
    }
}

/// Wilson score interval for `successes / trials` at the given confidence
///
/// Unlike the normal approximation it stays inside [0, 1] and keeps sensible
/// coverage near 0, near 1, and for small n. Zero trials yields `[0, 1]`.
pub fn wilson_interval(successes: u64, trials: u64, confidence: f64) -> Interval {
    if trials == 0 {
        return Interval::new(0.0, 1.0);
    }

    let n = trials as f64;
    let p = successes.min(trials) as f64 / n;
    let z = z_for_confidence(confidence);
    let z2 = z * z;

    let denominator = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denominator;
    let margin = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt() / denominator;

    Interval::new((center - margin).max(0.0), (center + margin).min(1.0))
}

/// Lift of a treatment over control
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiftEstimate {
    /// Absolute difference in conversion rate (treatment - control)
    pub absolute: f64,
    /// Relative lift `(p_t - p_c) / p_c`; undefined when control converts at 0
    pub relative: Option<f64>,
    /// Interval for the absolute difference
    pub interval: Interval,
    pub confidence: f64,
}

impl LiftEstimate {
    pub fn excludes_zero(&self) -> bool {
        self.interval.excludes_zero()
    }

    /// Treatment is significantly better than control
    pub fn is_positive(&self) -> bool {
        self.interval.lower > 0.0
    }
}

/// Newcombe hybrid score interval for `p_treatment - p_control`
///
/// Built from the two Wilson intervals, so it inherits their behaviour at the
/// boundaries. Missing data on either side yields the uninformative `[-1, 1]`.
pub fn lift_interval(control: ArmCounts, treatment: ArmCounts, confidence: f64) -> LiftEstimate {
    let p_c = control.rate();
    let p_t = treatment.rate();

    if control.trials == 0 || treatment.trials == 0 {
        return LiftEstimate {
            absolute: p_t - p_c,
            relative: None,
            interval: Interval::new(-1.0, 1.0),
            confidence,
        };
    }

    let wc = wilson_interval(control.successes, control.trials, confidence);
    let wt = wilson_interval(treatment.successes, treatment.trials, confidence);

    let diff = p_t - p_c;
    let lower = diff - ((p_t - wt.lower).powi(2) + (wc.upper - p_c).powi(2)).sqrt();
    let upper = diff + ((wt.upper - p_t).powi(2) + (p_c - wc.lower).powi(2)).sqrt();

    let relative = if p_c > 0.0 { Some(diff / p_c) } else { None };

    LiftEstimate {
        absolute: diff,
        relative,
        interval: Interval::new(lower.max(-1.0), upper.min(1.0)),
        confidence,
    }
}
