//! Statistics Tests
//!
//! Checks the statistical library against reference values and the
//! properties analysis relies on: interval monotonicity, degenerate inputs,
//! sequential boundaries and the omnibus gate.
//!
//! Run with: cargo test --test statistics_tests

use experiment_engine::stats::{
    bayesian_analysis, lift_interval, one_way_anova, required_sample_size, sample_ratio_mismatch,
    sprt, wilson_interval, ArmCounts, SequentialDecision, SprtConfig,
};

const EPS: f64 = 1e-3;

// ============================================================================
// WILSON INTERVALS
// ============================================================================

#[test]
fn test_wilson_reference_values() {
    let interval = wilson_interval(50, 1000, 0.95);
    assert!((interval.lower - 0.0381).abs() < EPS, "lower: {}", interval.lower);
    assert!((interval.upper - 0.0653).abs() < EPS, "upper: {}", interval.upper);
    assert!(interval.contains(0.05));
}

#[test]
fn test_wider_confidence_never_narrows_interval() {
    for trials in [1u64, 10, 100, 1_000, 25_000] {
        for successes in [0, trials / 10, trials / 2, trials] {
            let narrow = wilson_interval(successes, trials, 0.95);
            let wide = wilson_interval(successes, trials, 0.99);
            assert!(
                wide.lower <= narrow.lower + 1e-12 && wide.upper >= narrow.upper - 1e-12,
                "{successes}/{trials}: {narrow:?} vs {wide:?}"
            );
        }
    }
}

#[test]
fn test_zero_trials_degrade_to_full_range() {
    let interval = wilson_interval(0, 0, 0.95);
    assert_eq!(interval.lower, 0.0);
    assert_eq!(interval.upper, 1.0);
}

#[test]
fn test_interval_stays_in_unit_range() {
    for (s, n) in [(0u64, 5u64), (5, 5), (1, 2), (999, 1000)] {
        let interval = wilson_interval(s, n, 0.999);
        assert!(interval.lower >= 0.0 && interval.upper <= 1.0);
        assert!(interval.lower <= interval.upper);
    }
}

// ============================================================================
// LIFT
// ============================================================================

#[test]
fn test_clear_lift_excludes_zero() {
    let lift = lift_interval(ArmCounts::new(1000, 50), ArmCounts::new(1000, 80), 0.95);
    assert!((lift.absolute - 0.03).abs() < 1e-12);
    assert!((lift.relative.unwrap() - 0.6).abs() < 1e-9);
    assert!(lift.excludes_zero());
    assert!(lift.is_positive());
    assert!(lift.interval.lower > 0.0 && lift.interval.upper < 0.06);
}

#[test]
fn test_identical_arms_straddle_zero() {
    let lift = lift_interval(ArmCounts::new(500, 50), ArmCounts::new(500, 50), 0.95);
    assert_eq!(lift.absolute, 0.0);
    assert!(!lift.excludes_zero());
    assert!(lift.interval.lower < 0.0 && lift.interval.upper > 0.0);
}

#[test]
fn test_relative_lift_undefined_without_control_conversions() {
    let lift = lift_interval(ArmCounts::new(100, 0), ArmCounts::new(100, 5), 0.95);
    assert!(lift.relative.is_none());
}

// ============================================================================
// SEQUENTIAL TESTING
// ============================================================================

#[test]
fn test_sprt_decisions() {
    let config = SprtConfig::default();
    let control = ArmCounts::new(1000, 50);

    assert_eq!(
        sprt(control, ArmCounts::new(1000, 80), &config).decision,
        SequentialDecision::AcceptAlternative
    );
    assert_eq!(
        sprt(control, ArmCounts::new(1000, 50), &config).decision,
        SequentialDecision::Continue
    );
    assert_eq!(
        sprt(control, ArmCounts::new(1000, 30), &config).decision,
        SequentialDecision::AcceptNull
    );
}

#[test]
fn test_sprt_without_control_conversions_continues() {
    let outcome = sprt(
        ArmCounts::new(500, 0),
        ArmCounts::new(500, 40),
        &SprtConfig::default(),
    );
    assert_eq!(outcome.decision, SequentialDecision::Continue);
    assert_eq!(outcome.log_likelihood_ratio, 0.0);
}

// ============================================================================
// ANOVA
// ============================================================================

#[test]
fn test_anova_identical_groups() {
    let arm = ArmCounts::new(1000, 100);
    let result = one_way_anova(&[arm, arm, arm]);
    assert_eq!(result.df_between, 2);
    assert_eq!(result.df_within, 2997);
    assert!(result.f_statistic.abs() < 1e-9);
    assert!(result.p_value > 0.99);
    assert!(!result.is_significant(0.05));
}

#[test]
fn test_anova_detects_outlier_group() {
    let result = one_way_anova(&[
        ArmCounts::new(1000, 50),
        ArmCounts::new(1000, 55),
        ArmCounts::new(1000, 150),
    ]);
    assert!(result.f_statistic > 10.0);
    assert!(result.p_value < 0.001);
    assert!(result.is_significant(0.05));
}

#[test]
fn test_anova_ignores_empty_groups() {
    let result = one_way_anova(&[ArmCounts::new(0, 0), ArmCounts::new(100, 10)]);
    assert_eq!(result.p_value, 1.0);
}

// ============================================================================
// BAYESIAN
// ============================================================================

#[test]
fn test_bayesian_probabilities() {
    let arms = [ArmCounts::new(1000, 50), ArmCounts::new(1000, 80)];
    let summary = bayesian_analysis(&arms, 20_000, 7);

    let total: f64 = summary.arms.iter().map(|a| a.probability_best).sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(summary.arms[1].probability_best > 0.95);
    assert_eq!(summary.most_likely_best(), Some(1));
    assert!(summary.arms[1].expected_loss < summary.arms[0].expected_loss);
}

#[test]
fn test_bayesian_seed_is_deterministic() {
    let arms = [ArmCounts::new(200, 20), ArmCounts::new(200, 24)];
    let a = bayesian_analysis(&arms, 5_000, 42);
    let b = bayesian_analysis(&arms, 5_000, 42);
    assert_eq!(a.arms[0].probability_best, b.arms[0].probability_best);
    assert_eq!(a.arms[1].expected_loss, b.arms[1].expected_loss);
}

#[test]
fn test_bayesian_draws_are_capped() {
    let arms = [ArmCounts::new(10, 1), ArmCounts::new(10, 2)];
    assert_eq!(bayesian_analysis(&arms, 10, 1).draws, 1_000);
    assert_eq!(bayesian_analysis(&arms, 50_000_000, 1).draws, 1_000_000);
}

// ============================================================================
// POWER AND TRAFFIC CHECKS
// ============================================================================

#[test]
fn test_required_sample_size_reference() {
    let n = required_sample_size(0.05, 0.06, 0.95, 0.8).unwrap();
    assert!((8_100..=8_220).contains(&n), "n = {n}");
    assert!(required_sample_size(0.05, 0.05, 0.95, 0.8).is_none());
}

#[test]
fn test_sample_ratio_mismatch() {
    let balanced = sample_ratio_mismatch(&[5_000, 5_000], &[50, 50]);
    assert!(!balanced.mismatch_detected);
    assert!(balanced.p_value > 0.99);

    let skewed = sample_ratio_mismatch(&[5_300, 4_700], &[50, 50]);
    assert!((skewed.chi_squared - 36.0).abs() < 1e-9);
    assert!(skewed.mismatch_detected);

    let weighted = sample_ratio_mismatch(&[3_000, 7_000], &[30, 70]);
    assert!(!weighted.mismatch_detected);
}
