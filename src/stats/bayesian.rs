//! Bayesian analysis using a Beta-Binomial model
//!
//! Each arm's conversion rate is modelled as Beta(1 + conversions,
//! 1 + impressions - conversions), i.e. a uniform prior. All arms are sampled
//! together per draw so that probability-of-being-best and expected loss come
//! from the same joint samples.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};

use super::wilson::Interval;
use super::ArmCounts;
use crate::constants::{
    CREDIBLE_INTERVAL_HIGH, CREDIBLE_INTERVAL_LOW, MAX_MONTE_CARLO_DRAWS, MIN_MONTE_CARLO_DRAWS,
};

/// Posterior summary for one arm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesianArm {
    /// Mean of the Beta posterior
    pub posterior_mean: f64,
    /// Fraction of draws in which this arm had the highest sampled rate
    pub probability_best: f64,
    /// Average shortfall versus the best arm in the same draw
    pub expected_loss: f64,
    /// 95% credible interval from the posterior samples
    pub credible_interval: Interval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesianSummary {
    /// Draws actually used after clamping
    pub draws: usize,
    /// One entry per input arm, same order
    pub arms: Vec<BayesianArm>,
}

impl BayesianSummary {
    /// Index of the arm most likely to be best
    pub fn most_likely_best(&self) -> Option<usize> {
        self.arms
            .iter()
            .enumerate()
            .max_by(|a, b| {
                a.1.probability_best
                    .partial_cmp(&b.1.probability_best)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(idx, _)| idx)
    }
}

/// Monte Carlo posterior comparison across all arms
///
/// `draws` is clamped to `[MIN_MONTE_CARLO_DRAWS, MAX_MONTE_CARLO_DRAWS]`; the
/// seeded generator makes the result reproducible for identical counts.
pub fn bayesian_analysis(arms: &[ArmCounts], draws: usize, seed: u64) -> BayesianSummary {
    let draws = clamp_draws(draws);
    if arms.is_empty() {
        return BayesianSummary {
            draws,
            arms: Vec::new(),
        };
    }

    let params: Vec<(f64, f64)> = arms
        .iter()
        .map(|arm| (1.0 + arm.successes as f64, 1.0 + arm.failures() as f64))
        .collect();
    let posteriors: Vec<Option<Beta<f64>>> = params
        .iter()
        .map(|&(alpha, beta)| Beta::new(alpha, beta).ok())
        .collect();
    let means: Vec<f64> = params
        .iter()
        .map(|&(alpha, beta)| alpha / (alpha + beta))
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut samples: Vec<Vec<f64>> = vec![Vec::with_capacity(draws); arms.len()];
    let mut wins = vec![0u64; arms.len()];
    let mut loss_sums = vec![0.0f64; arms.len()];
    let mut draw = vec![0.0f64; arms.len()];

    for _ in 0..draws {
        let mut best_idx = 0;
        for (idx, posterior) in posteriors.iter().enumerate() {
            let value = match posterior {
                Some(dist) => dist.sample(&mut rng),
                None => means[idx],
            };
            draw[idx] = value;
            if value > draw[best_idx] {
                best_idx = idx;
            }
        }

        let best = draw[best_idx];
        wins[best_idx] += 1;
        for (idx, &value) in draw.iter().enumerate() {
            loss_sums[idx] += best - value;
            samples[idx].push(value);
        }
    }

    let summaries = samples
        .into_iter()
        .enumerate()
        .map(|(idx, mut arm_samples)| {
            arm_samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            BayesianArm {
                posterior_mean: means[idx],
                probability_best: wins[idx] as f64 / draws as f64,
                expected_loss: loss_sums[idx] / draws as f64,
                credible_interval: Interval::new(
                    percentile(&arm_samples, CREDIBLE_INTERVAL_LOW),
                    percentile(&arm_samples, CREDIBLE_INTERVAL_HIGH),
                ),
            }
        })
        .collect();

    BayesianSummary {
        draws,
        arms: summaries,
    }
}

/// Hard iteration cap for Monte Carlo work
pub fn clamp_draws(draws: usize) -> usize {
    draws.clamp(MIN_MONTE_CARLO_DRAWS, MAX_MONTE_CARLO_DRAWS)
}

/// Nearest-rank percentile of sorted samples
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
