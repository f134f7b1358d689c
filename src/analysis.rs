//! Experiment result builder
//!
//! Turns an experiment snapshot into an [`ExperimentResult`]: per-variant
//! intervals, lift against control, optional Bayesian and sequential
//! annotations, the ANOVA gate, a sample ratio check and a recommended action.
//!
//! Results are derived data. They are recomputed from counters on every call
//! and are never written back as state.
//!
//! Multiple comparisons: with k variants there are k-1 treatment-vs-control
//! tests. For three or more variants the omnibus ANOVA must reject at alpha
//! first, and each pairwise interval is then built at 1 - alpha/(k-1)
//! (Bonferroni).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::constants::{DEFAULT_MONTE_CARLO_DRAWS, DEFAULT_MONTE_CARLO_SEED, TARGET_POWER};
use crate::experiment::types::{Experiment, ExperimentStatus, WinnerStrategy};
use crate::metrics::{Timer, ANALYSIS_DURATION};
use crate::selection::strategy::{advance, strategy_for, SelectionPhase, Signal};
use crate::stats::{
    bayesian_analysis, lift_interval, one_way_anova, required_sample_size, sample_ratio_mismatch,
    sprt, wilson_interval, AnovaResult, ArmCounts, BayesianArm, Interval, LiftEstimate,
    SampleRatioCheck, SprtOutcome,
};

/// Monte Carlo settings for Bayesian annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub monte_carlo_draws: usize,
    pub monte_carlo_seed: u64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            monte_carlo_draws: DEFAULT_MONTE_CARLO_DRAWS,
            monte_carlo_seed: DEFAULT_MONTE_CARLO_SEED,
        }
    }
}

impl From<&EngineConfig> for AnalysisOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            monte_carlo_draws: config.monte_carlo_draws,
            monte_carlo_seed: config.monte_carlo_seed,
        }
    }
}

/// What the caller should do next with an experiment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecommendedAction {
    /// Enough data, but no variant satisfies the strategy (or it is still confirming)
    Continue,
    SelectWinner {
        variant_id: Uuid,
    },
    NeedsMoreData {
        /// Impressions the furthest-behind variant still needs
        remaining_per_variant: u64,
        /// Total impressions across the experiment at current splits
        estimated_remaining_total: u64,
        /// Extrapolated from the accrual rate since start
        estimated_time_remaining: Option<Duration>,
    },
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::SelectWinner { .. } => "select_winner",
            Self::NeedsMoreData { .. } => "needs_more_data",
        }
    }

    pub fn winner(&self) -> Option<Uuid> {
        match self {
            Self::SelectWinner { variant_id } => Some(*variant_id),
            _ => None,
        }
    }
}

/// Statistics for one variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantResult {
    pub variant_id: Uuid,
    pub name: String,
    pub is_control: bool,
    pub split_percent: u32,
    pub impressions: u64,
    pub conversions: u64,
    pub total_value: f64,
    pub conversion_rate: f64,
    pub value_per_impression: f64,
    /// Wilson interval at the comparison confidence
    pub interval: Interval,
    /// Lift over control; `None` for the control itself
    pub lift: Option<LiftEstimate>,
    pub bayesian: Option<BayesianArm>,
    /// SPRT against control; `None` for the control or when not configured
    pub sequential: Option<SprtOutcome>,
}

/// Derived snapshot of an experiment's statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub experiment_id: Uuid,
    pub status: ExperimentStatus,
    pub strategy: WinnerStrategy,
    /// Configured confidence level
    pub significance_level: f64,
    /// Confidence actually used for pairwise intervals after strategy and
    /// multiple-comparison adjustments
    pub comparison_confidence: f64,
    pub total_impressions: u64,
    pub total_conversions: u64,
    /// Impressions each variant needs under the strategy
    pub sample_target: u64,
    pub min_sample_reached: bool,
    pub variants: Vec<VariantResult>,
    /// Omnibus test; only computed for three or more variants, over the
    /// variants that have impressions
    pub anova: Option<AnovaResult>,
    /// ANOVA rejected the null, or fewer than three variants
    pub omnibus_passed: bool,
    pub sample_ratio: SampleRatioCheck,
    /// Per-variant sample needed to detect the best observed lift at 80% power
    pub suggested_sample_per_variant: Option<u64>,
    /// Leading variant that satisfies the strategy right now
    pub candidate: Option<Uuid>,
    pub phase: SelectionPhase,
    pub recommended_action: RecommendedAction,
    pub computed_at: DateTime<Utc>,
}

impl ExperimentResult {
    pub fn variant(&self, variant_id: Uuid) -> Option<&VariantResult> {
        self.variants.iter().find(|v| v.variant_id == variant_id)
    }

    pub fn control(&self) -> Option<&VariantResult> {
        self.variants.iter().find(|v| v.is_control)
    }
}

/// Build a result for `experiment`, advancing the selection phase from `phase`
pub fn analyze(
    experiment: &Experiment,
    options: &AnalysisOptions,
    phase: SelectionPhase,
) -> ExperimentResult {
    let _timer = Timer::new(ANALYSIS_DURATION.clone());
    let now = Utc::now();

    let strategy = strategy_for(experiment.strategy);
    let base_confidence = strategy.confidence(experiment.significance_level);
    let comparisons = experiment.treatments().count().max(1);
    let comparison_confidence = 1.0 - (1.0 - base_confidence) / comparisons as f64;

    let arms: Vec<ArmCounts> = experiment.variants.iter().map(|v| v.counters.arm()).collect();
    let control_arm = experiment
        .control()
        .map(|c| c.counters.arm())
        .unwrap_or_default();

    let anova = (experiment.variants.len() >= 3).then(|| one_way_anova(&arms));
    let omnibus_passed = anova.map_or(true, |a| a.is_significant(1.0 - base_confidence));

    let bayesian = experiment.bayesian_enabled.then(|| {
        bayesian_analysis(&arms, options.monte_carlo_draws, options.monte_carlo_seed)
    });

    let variants: Vec<VariantResult> = experiment
        .variants
        .iter()
        .enumerate()
        .map(|(idx, v)| {
            let arm = arms[idx];
            let lift = (!v.is_control).then(|| lift_interval(control_arm, arm, comparison_confidence));
            let sequential = experiment
                .sequential
                .filter(|_| !v.is_control)
                .map(|config| sprt(control_arm, arm, &config));
            VariantResult {
                variant_id: v.id,
                name: v.name.clone(),
                is_control: v.is_control,
                split_percent: v.split_percent,
                impressions: v.counters.impressions,
                conversions: v.counters.conversions,
                total_value: v.counters.total_value,
                conversion_rate: v.counters.conversion_rate(),
                value_per_impression: v.counters.value_per_impression(),
                interval: wilson_interval(arm.successes, arm.trials, comparison_confidence),
                lift,
                bayesian: bayesian.as_ref().and_then(|b| b.arms.get(idx).cloned()),
                sequential,
            }
        })
        .collect();

    let impressions: Vec<u64> = experiment.variants.iter().map(|v| v.counters.impressions).collect();
    let splits: Vec<u32> = experiment.variants.iter().map(|v| v.split_percent).collect();
    let sample_ratio = sample_ratio_mismatch(&impressions, &splits);

    let sample_target =
        (experiment.min_sample_size as f64 * strategy.sample_multiplier()).ceil() as u64;
    let min_variant_impressions = experiment.min_variant_impressions();
    let min_sample_reached = min_variant_impressions >= sample_target;

    let control_result = variants.iter().find(|v| v.is_control);
    let candidate = match control_result {
        Some(control) if omnibus_passed => leading_variant(&variants, |v| {
            v.lift.as_ref().is_some_and(LiftEstimate::is_positive) && strategy.accepts(v, control)
        }),
        _ => None,
    };

    let suggested_sample_per_variant = best_observed_lift(&variants).and_then(|treatment| {
        required_sample_size(
            control_arm.rate(),
            treatment.conversion_rate,
            base_confidence,
            TARGET_POWER,
        )
    });

    let signal = Signal {
        candidate,
        samples_met: min_sample_reached,
        min_variant_impressions,
        min_sample_size: experiment.min_sample_size,
    };
    let (phase, action) = advance(strategy, phase, &signal);
    let recommended_action =
        action.unwrap_or_else(|| needs_more_data(experiment, sample_target, now));

    ExperimentResult {
        experiment_id: experiment.id,
        status: experiment.status,
        strategy: experiment.strategy,
        significance_level: experiment.significance_level,
        comparison_confidence,
        total_impressions: experiment.total_impressions(),
        total_conversions: experiment.variants.iter().map(|v| v.counters.conversions).sum(),
        sample_target,
        min_sample_reached,
        variants,
        anova,
        omnibus_passed,
        sample_ratio,
        suggested_sample_per_variant,
        candidate,
        phase,
        recommended_action,
        computed_at: now,
    }
}

/// Tie-break among qualifying treatments: highest absolute lift, then higher
/// lift lower bound, then creation order
fn leading_variant(
    variants: &[VariantResult],
    qualifies: impl Fn(&VariantResult) -> bool,
) -> Option<Uuid> {
    let mut best: Option<(&VariantResult, &LiftEstimate)> = None;
    for variant in variants.iter().filter(|v| qualifies(v)) {
        let Some(lift) = variant.lift.as_ref() else {
            continue;
        };
        let better = match best {
            None => true,
            Some((_, current)) => {
                lift.absolute > current.absolute
                    || (lift.absolute == current.absolute
                        && lift.interval.lower > current.interval.lower)
            }
        };
        if better {
            best = Some((variant, lift));
        }
    }
    best.map(|(v, _)| v.variant_id)
}

fn best_observed_lift(variants: &[VariantResult]) -> Option<&VariantResult> {
    variants
        .iter()
        .filter(|v| v.lift.is_some())
        .max_by(|a, b| {
            let la = a.lift.map_or(f64::MIN, |l| l.absolute);
            let lb = b.lift.map_or(f64::MIN, |l| l.absolute);
            la.partial_cmp(&lb).unwrap_or(std::cmp::Ordering::Equal)
        })
}

fn needs_more_data(
    experiment: &Experiment,
    sample_target: u64,
    now: DateTime<Utc>,
) -> RecommendedAction {
    let split_total: u32 = experiment.variants.iter().map(|v| v.split_percent).sum();

    let mut remaining_per_variant = 0u64;
    let mut estimated_remaining_total = 0u64;
    for variant in &experiment.variants {
        let remaining = sample_target.saturating_sub(variant.counters.impressions);
        remaining_per_variant = remaining_per_variant.max(remaining);
        if remaining > 0 && variant.split_percent > 0 && split_total > 0 {
            // Overall traffic needed for this variant's share to cover its gap
            let share = variant.split_percent as f64 / split_total as f64;
            estimated_remaining_total =
                estimated_remaining_total.max((remaining as f64 / share).ceil() as u64);
        }
    }

    let estimated_time_remaining = experiment.started_at.and_then(|started| {
        let elapsed = (now - started).num_milliseconds() as f64 / 1_000.0;
        let observed = experiment.total_impressions() as f64;
        if elapsed <= 0.0 || observed <= 0.0 {
            return None;
        }
        let rate = observed / elapsed;
        Duration::try_from_secs_f64(estimated_remaining_total as f64 / rate).ok()
    });

    RecommendedAction::NeedsMoreData {
        remaining_per_variant,
        estimated_remaining_total,
        estimated_time_remaining,
    }
}
