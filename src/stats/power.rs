//! Sample size estimation and sample ratio mismatch detection

use serde::{Deserialize, Serialize};

use super::distributions::{chi_squared_sf, inverse_normal_cdf, z_for_confidence};
use crate::constants::SRM_P_VALUE_THRESHOLD;

/// Per-arm sample size for a two-proportion z-test
///
/// Returns `None` when the rates are indistinguishable, since no finite sample
/// detects a zero effect.
pub fn required_sample_size(
    control_rate: f64,
    treatment_rate: f64,
    confidence: f64,
    power: f64,
) -> Option<u64> {
    let p1 = control_rate.clamp(0.0, 1.0);
    let p2 = treatment_rate.clamp(0.0, 1.0);
    let effect = (p2 - p1).abs();
    if effect < 1e-9 {
        return None;
    }

    let z_alpha = z_for_confidence(confidence);
    let z_beta = inverse_normal_cdf(power.clamp(0.5, 0.9999));
    let pooled = (p1 + p2) / 2.0;

    let numerator = z_alpha * (2.0 * pooled * (1.0 - pooled)).sqrt()
        + z_beta * (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt();
    let n = (numerator / effect).powi(2);

    if n.is_finite() {
        Some(n.ceil().max(1.0) as u64)
    } else {
        None
    }
}

/// Sample ratio mismatch check result
///
/// A mismatch means observed traffic deviates from the configured splits more
/// than chance allows, which usually points at a bucketing or logging bug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRatioCheck {
    pub chi_squared: f64,
    pub p_value: f64,
    pub mismatch_detected: bool,
    pub expected_shares: Vec<f64>,
    pub observed_shares: Vec<f64>,
}

/// Chi-squared goodness of fit of observed impressions against split percentages
pub fn sample_ratio_mismatch(observed: &[u64], expected_percent: &[u32]) -> SampleRatioCheck {
    let total: u64 = observed.iter().sum();
    let split_total: u32 = expected_percent.iter().sum();

    let expected_shares: Vec<f64> = expected_percent
        .iter()
        .map(|&pct| {
            if split_total == 0 {
                0.0
            } else {
                pct as f64 / split_total as f64
            }
        })
        .collect();
    let observed_shares: Vec<f64> = observed
        .iter()
        .map(|&n| if total == 0 { 0.0 } else { n as f64 / total as f64 })
        .collect();

    if total == 0 || observed.len() != expected_percent.len() || observed.len() < 2 {
        return SampleRatioCheck {
            chi_squared: 0.0,
            p_value: 1.0,
            mismatch_detected: false,
            expected_shares,
            observed_shares,
        };
    }

    let mut chi_squared = 0.0;
    let mut categories = 0u32;
    for (&count, &share) in observed.iter().zip(&expected_shares) {
        let expected = share * total as f64;
        if expected > 0.0 {
            chi_squared += (count as f64 - expected).powi(2) / expected;
            categories += 1;
        }
    }

    let p_value = if categories >= 2 {
        chi_squared_sf(chi_squared, (categories - 1) as f64)
    } else {
        1.0
    };

    SampleRatioCheck {
        chi_squared,
        p_value,
        mismatch_detected: p_value < SRM_P_VALUE_THRESHOLD,
        expected_shares,
        observed_shares,
    }
}
