//! Winner-selection strategies
//!
//! A strategy adjusts three things: the confidence used for pairwise tests,
//! the sample each variant needs before a winner may be named, and any extra
//! requirement a significant variant must meet. The phase machine in
//! [`advance`] is shared by all strategies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{RecommendedAction, VariantResult};
use crate::constants::{
    CONSERVATIVE_CONFIRMATION_MULTIPLIER, SAFETY_FIRST_CONFIDENCE, SAFETY_FIRST_SAMPLE_MULTIPLIER,
};
use crate::experiment::types::WinnerStrategy;

/// Per-experiment selection progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SelectionPhase {
    /// No variant currently satisfies the strategy
    #[default]
    AwaitingSignificance,
    /// Significance seen at `since_impressions`; it must hold until samples
    /// reach both the confirmation window and `since_impressions` plus the
    /// window's excess over the minimum sample
    Confirming {
        variant_id: Uuid,
        /// Smallest per-variant impression count at the first crossing
        since_impressions: u64,
    },
    /// A variant satisfies the strategy and may be selected
    Significant { variant_id: Uuid },
    /// Winner recorded; final
    WinnerSelected { variant_id: Uuid },
}

impl SelectionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingSignificance => "awaiting_significance",
            Self::Confirming { .. } => "confirming",
            Self::Significant { .. } => "significant",
            Self::WinnerSelected { .. } => "winner_selected",
        }
    }
}

pub trait SelectionStrategy: Send + Sync {
    fn kind(&self) -> WinnerStrategy;

    /// Confidence level for pairwise lift intervals
    fn confidence(&self, configured: f64) -> f64 {
        configured
    }

    /// Multiple of the minimum sample every variant needs before selection
    fn sample_multiplier(&self) -> f64 {
        1.0
    }

    /// Multiple of the minimum sample through which significance must hold
    /// after the first crossing, if the strategy confirms at all
    fn confirmation_multiplier(&self) -> Option<f64> {
        None
    }

    /// Requirement beyond a strictly positive lift interval
    fn accepts(&self, _candidate: &VariantResult, _control: &VariantResult) -> bool {
        true
    }
}

/// Select as soon as significance and minimum sample are reached
pub struct Immediate;

impl SelectionStrategy for Immediate {
    fn kind(&self) -> WinnerStrategy {
        WinnerStrategy::Immediate
    }
}

/// Significance must hold on every evaluation through 1.5x the minimum sample,
/// and for at least half the minimum sample after it was first observed
pub struct Conservative;

impl SelectionStrategy for Conservative {
    fn kind(&self) -> WinnerStrategy {
        WinnerStrategy::Conservative
    }

    fn confirmation_multiplier(&self) -> Option<f64> {
        Some(CONSERVATIVE_CONFIRMATION_MULTIPLIER)
    }
}

/// Significance plus higher value per impression than control
pub struct Economic;

impl SelectionStrategy for Economic {
    fn kind(&self) -> WinnerStrategy {
        WinnerStrategy::Economic
    }

    fn accepts(&self, candidate: &VariantResult, control: &VariantResult) -> bool {
        candidate.value_per_impression > control.value_per_impression
    }
}

/// 99% confidence at minimum, positive lower bound, twice the minimum sample
pub struct SafetyFirst;

impl SelectionStrategy for SafetyFirst {
    fn kind(&self) -> WinnerStrategy {
        WinnerStrategy::SafetyFirst
    }

    fn confidence(&self, configured: f64) -> f64 {
        configured.max(SAFETY_FIRST_CONFIDENCE)
    }

    fn sample_multiplier(&self) -> f64 {
        SAFETY_FIRST_SAMPLE_MULTIPLIER
    }

    fn accepts(&self, candidate: &VariantResult, _control: &VariantResult) -> bool {
        candidate
            .lift
            .as_ref()
            .is_some_and(|lift| lift.interval.lower > 0.0)
    }
}

/// Strategy implementation for a configured strategy kind
pub fn strategy_for(kind: WinnerStrategy) -> &'static dyn SelectionStrategy {
    match kind {
        WinnerStrategy::Immediate => &Immediate,
        WinnerStrategy::Conservative => &Conservative,
        WinnerStrategy::Economic => &Economic,
        WinnerStrategy::SafetyFirst => &SafetyFirst,
    }
}

/// What the latest analysis says, independent of history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    /// Leading variant that satisfies the strategy at the current sample
    pub candidate: Option<Uuid>,
    /// Every variant has the strategy's required sample
    pub samples_met: bool,
    /// Smallest per-variant impression count
    pub min_variant_impressions: u64,
    /// Configured minimum sample per variant
    pub min_sample_size: u64,
}

/// Next phase and action for a strategy given the previous phase
///
/// `None` for the action means the caller must report how much data is
/// still missing.
pub fn advance(
    strategy: &dyn SelectionStrategy,
    phase: SelectionPhase,
    signal: &Signal,
) -> (SelectionPhase, Option<RecommendedAction>) {
    if let SelectionPhase::WinnerSelected { variant_id } = phase {
        return (phase, Some(RecommendedAction::SelectWinner { variant_id }));
    }

    if !signal.samples_met {
        return (SelectionPhase::AwaitingSignificance, None);
    }

    let Some(variant_id) = signal.candidate else {
        // Any non-significant evaluation resets confirmation
        return (
            SelectionPhase::AwaitingSignificance,
            Some(RecommendedAction::Continue),
        );
    };

    let Some(multiplier) = strategy.confirmation_multiplier() else {
        return (
            SelectionPhase::Significant { variant_id },
            Some(RecommendedAction::SelectWinner { variant_id }),
        );
    };

    let since_impressions = match phase {
        // Already confirmed and still significant
        SelectionPhase::Significant {
            variant_id: confirmed,
        } if confirmed == variant_id => {
            return (phase, Some(RecommendedAction::SelectWinner { variant_id }))
        }
        SelectionPhase::Confirming {
            variant_id: confirming,
            since_impressions,
        } if confirming == variant_id => since_impressions,
        // A first crossing never selects, however late it is observed
        _ => {
            return (
                SelectionPhase::Confirming {
                    variant_id,
                    since_impressions: signal.min_variant_impressions,
                },
                Some(RecommendedAction::Continue),
            )
        }
    };

    let window = (signal.min_sample_size as f64 * multiplier).ceil() as u64;
    let hold = (signal.min_sample_size as f64 * (multiplier - 1.0)).ceil() as u64;
    let confirmed_at = window.max(since_impressions.saturating_add(hold));
    if signal.min_variant_impressions >= confirmed_at {
        (
            SelectionPhase::Significant { variant_id },
            Some(RecommendedAction::SelectWinner { variant_id }),
        )
    } else {
        (
            SelectionPhase::Confirming {
                variant_id,
                since_impressions,
            },
            Some(RecommendedAction::Continue),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(candidate: Option<Uuid>, impressions: u64) -> Signal {
        Signal {
            candidate,
            samples_met: impressions >= 100,
            min_variant_impressions: impressions,
            min_sample_size: 100,
        }
    }

    #[test]
    fn test_immediate_selects_on_first_crossing() {
        let v = Uuid::new_v4();
        let (phase, action) = advance(&Immediate, SelectionPhase::default(), &signal(Some(v), 100));
        assert_eq!(phase, SelectionPhase::Significant { variant_id: v });
        assert_eq!(action, Some(RecommendedAction::SelectWinner { variant_id: v }));
    }

    #[test]
    fn test_conservative_confirms_then_selects() {
        let v = Uuid::new_v4();
        let (phase, action) = advance(&Conservative, SelectionPhase::default(), &signal(Some(v), 100));
        assert_eq!(
            phase,
            SelectionPhase::Confirming {
                variant_id: v,
                since_impressions: 100
            }
        );
        assert_eq!(action, Some(RecommendedAction::Continue));

        let (phase, action) = advance(&Conservative, phase, &signal(Some(v), 120));
        assert!(matches!(phase, SelectionPhase::Confirming { since_impressions: 100, .. }));
        assert_eq!(action, Some(RecommendedAction::Continue));

        let (phase, action) = advance(&Conservative, phase, &signal(Some(v), 150));
        assert_eq!(phase, SelectionPhase::Significant { variant_id: v });
        assert_eq!(action, Some(RecommendedAction::SelectWinner { variant_id: v }));
    }

    #[test]
    fn test_conservative_resets_on_reversion() {
        let v = Uuid::new_v4();
        let (phase, _) = advance(&Conservative, SelectionPhase::default(), &signal(Some(v), 100));
        let (phase, action) = advance(&Conservative, phase, &signal(None, 130));
        assert_eq!(phase, SelectionPhase::AwaitingSignificance);
        assert_eq!(action, Some(RecommendedAction::Continue));

        // Crossing again restarts the window
        let (phase, _) = advance(&Conservative, phase, &signal(Some(v), 140));
        assert!(matches!(phase, SelectionPhase::Confirming { since_impressions: 140, .. }));
    }

    #[test]
    fn test_conservative_late_first_crossing_still_confirms() {
        let v = Uuid::new_v4();
        let (phase, action) = advance(&Conservative, SelectionPhase::default(), &signal(Some(v), 150));
        assert_eq!(
            phase,
            SelectionPhase::Confirming {
                variant_id: v,
                since_impressions: 150
            }
        );
        assert_eq!(action, Some(RecommendedAction::Continue));

        // Must hold for another half of the minimum sample
        let (phase, action) = advance(&Conservative, phase, &signal(Some(v), 190));
        assert!(matches!(phase, SelectionPhase::Confirming { since_impressions: 150, .. }));
        assert_eq!(action, Some(RecommendedAction::Continue));

        let (phase, action) = advance(&Conservative, phase, &signal(Some(v), 200));
        assert_eq!(phase, SelectionPhase::Significant { variant_id: v });
        assert_eq!(action, Some(RecommendedAction::SelectWinner { variant_id: v }));

        // A confirmed winner stays selectable while significance holds
        let (phase, action) = advance(&Conservative, phase, &signal(Some(v), 205));
        assert_eq!(phase, SelectionPhase::Significant { variant_id: v });
        assert_eq!(action, Some(RecommendedAction::SelectWinner { variant_id: v }));
    }

    #[test]
    fn test_conservative_candidate_change_restarts() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (phase, _) = advance(&Conservative, SelectionPhase::default(), &signal(Some(a), 100));
        let (phase, action) = advance(&Conservative, phase, &signal(Some(b), 160));
        assert_eq!(
            phase,
            SelectionPhase::Confirming {
                variant_id: b,
                since_impressions: 160
            }
        );
        assert_eq!(action, Some(RecommendedAction::Continue));
    }

    #[test]
    fn test_insufficient_sample_needs_data() {
        let v = Uuid::new_v4();
        let (phase, action) = advance(&Immediate, SelectionPhase::default(), &signal(Some(v), 40));
        assert_eq!(phase, SelectionPhase::AwaitingSignificance);
        assert!(action.is_none());
    }

    #[test]
    fn test_winner_selected_is_final() {
        let v = Uuid::new_v4();
        let (phase, action) = advance(
            &Immediate,
            SelectionPhase::WinnerSelected { variant_id: v },
            &signal(None, 1_000),
        );
        assert_eq!(phase, SelectionPhase::WinnerSelected { variant_id: v });
        assert_eq!(action, Some(RecommendedAction::SelectWinner { variant_id: v }));
    }

    #[test]
    fn test_safety_first_parameters() {
        assert_eq!(SafetyFirst.confidence(0.95), 0.99);
        assert_eq!(SafetyFirst.confidence(0.995), 0.995);
        assert_eq!(SafetyFirst.sample_multiplier(), 2.0);
        assert_eq!(strategy_for(WinnerStrategy::Economic).kind(), WinnerStrategy::Economic);
    }
}
