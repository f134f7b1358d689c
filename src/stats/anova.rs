//! One-way ANOVA on conversion indicators
//!
//! Each impression contributes a 0/1 observation. For three or more variants
//! the F-test acts as a gate: pairwise comparisons only run once the omnibus
//! test says some variant differs.

use serde::{Deserialize, Serialize};

use super::distributions::f_distribution_sf;
use super::ArmCounts;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnovaResult {
    pub ss_between: f64,
    pub ss_within: f64,
    pub df_between: u64,
    pub df_within: u64,
    pub f_statistic: f64,
    pub p_value: f64,
}

impl AnovaResult {
    /// Some group differs at significance `alpha`
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// F-test across arms; arms with zero trials are left out, so `df_between`
/// counts only arms that have impressions
pub fn one_way_anova(arms: &[ArmCounts]) -> AnovaResult {
    let groups: Vec<&ArmCounts> = arms.iter().filter(|arm| arm.trials > 0).collect();
    let k = groups.len() as u64;
    let total: u64 = groups.iter().map(|arm| arm.trials).sum();

    let inconclusive = |ss_between: f64, ss_within: f64| AnovaResult {
        ss_between,
        ss_within,
        df_between: k.saturating_sub(1),
        df_within: total.saturating_sub(k),
        f_statistic: 0.0,
        p_value: 1.0,
    };

    if k < 2 || total <= k {
        return inconclusive(0.0, 0.0);
    }

    let grand_mean =
        groups.iter().map(|arm| arm.successes as f64).sum::<f64>() / total as f64;

    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for arm in &groups {
        let n = arm.trials as f64;
        let mean = arm.rate();
        ss_between += n * (mean - grand_mean).powi(2);
        // Sum of squared deviations of 0/1 values around the group mean
        ss_within += n * mean * (1.0 - mean);
    }

    let df_between = k - 1;
    let df_within = total - k;

    if ss_within <= f64::EPSILON {
        // Every group is constant; any between-group spread is a perfect split
        return if ss_between > f64::EPSILON {
            AnovaResult {
                ss_between,
                ss_within,
                df_between,
                df_within,
                f_statistic: f64::INFINITY,
                p_value: 0.0,
            }
        } else {
            inconclusive(ss_between, ss_within)
        };
    }

    let ms_between = ss_between / df_between as f64;
    let ms_within = ss_within / df_within as f64;
    let f_statistic = ms_between / ms_within;
    let p_value = f_distribution_sf(f_statistic, df_between as f64, df_within as f64);

    AnovaResult {
        ss_between,
        ss_within,
        df_between,
        df_within,
        f_statistic,
        p_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_groups_not_significant() {
        let arms = [
            ArmCounts::new(500, 50),
            ArmCounts::new(500, 50),
            ArmCounts::new(500, 50),
        ];
        let result = one_way_anova(&arms);
        assert_eq!(result.f_statistic, 0.0);
        assert!((result.p_value - 1.0).abs() < 1e-9);
        assert!(!result.is_significant(0.05));
    }

    #[test]
    fn test_one_group_differs() {
        let arms = [
            ArmCounts::new(1000, 50),
            ArmCounts::new(1000, 50),
            ArmCounts::new(1000, 100),
        ];
        let result = one_way_anova(&arms);
        assert_eq!(result.df_between, 2);
        assert_eq!(result.df_within, 2997);
        assert!((result.f_statistic - 13.5).abs() < 0.1, "F was {}", result.f_statistic);
        assert!(result.p_value < 0.001);
    }

    #[test]
    fn test_too_few_groups() {
        let result = one_way_anova(&[ArmCounts::new(100, 10), ArmCounts::default()]);
        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.df_between, 0);
    }

    #[test]
    fn test_empty_arm_excluded_from_groups() {
        let arms = [
            ArmCounts::new(1000, 50),
            ArmCounts::default(),
            ArmCounts::new(1000, 100),
        ];
        let result = one_way_anova(&arms);
        assert_eq!(result.df_between, 1);
        assert_eq!(result.df_within, 1998);
        assert!(result.p_value < 0.001);
    }

    #[test]
    fn test_perfect_separation() {
        let arms = [ArmCounts::new(50, 0), ArmCounts::new(50, 50)];
        let result = one_way_anova(&arms);
        assert_eq!(result.p_value, 0.0);
        assert!(result.f_statistic.is_infinite());
    }
}
