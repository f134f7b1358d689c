//! Winner Selection Tests
//!
//! End-to-end scenarios: traffic is tracked through the engine, then the
//! experiment is analyzed and evaluated under each selection strategy.
//!
//! Run with: cargo test --test winner_selection_tests

use experiment_engine::{
    EngineConfig, Experiment, ExperimentEngine, ExperimentStatus, NewVariant, RecommendedAction,
    SelectionPhase, TrackEvent, WinnerStrategy,
};
use experiment_engine::stats::SprtConfig;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn running_experiment(
    engine: &ExperimentEngine,
    name: &str,
    strategy: WinnerStrategy,
    splits: &[u32],
) -> Experiment {
    let mut builder = engine
        .new_experiment("workspace-1", name)
        .strategy(strategy)
        .min_sample_size(100);
    for (idx, &split) in splits.iter().enumerate() {
        builder = builder.variant(if idx == 0 {
            NewVariant::control("control", split)
        } else {
            NewVariant::treatment(&format!("treatment-{idx}"), split)
        });
    }
    let exp = engine.create_experiment(builder.build()).unwrap();
    engine.start_experiment(exp.id).unwrap()
}

/// Track `impressions` impressions and `conversions` conversions against a variant
fn feed(
    engine: &ExperimentEngine,
    exp: &Experiment,
    idx: usize,
    impressions: u64,
    conversions: u64,
    value: Option<f64>,
) {
    let variant_id = exp.variants[idx].id;
    let offset = engine.get_experiment(exp.id).unwrap().variants[idx]
        .counters
        .impressions;
    for i in 0..impressions {
        let visitor = format!("{idx}-{}", offset + i);
        engine
            .track_event(exp.id, variant_id, TrackEvent::impression(&visitor))
            .unwrap();
        if i < conversions {
            let mut event = TrackEvent::conversion(&visitor);
            if let Some(v) = value {
                event = event.with_value(v);
            }
            engine.track_event(exp.id, variant_id, event).unwrap();
        }
    }
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_clear_winner_immediate() {
    let engine = ExperimentEngine::new(EngineConfig::default());
    let exp = running_experiment(&engine, "clear", WinnerStrategy::Immediate, &[50, 50]);
    feed(&engine, &exp, 0, 1000, 50, None);
    feed(&engine, &exp, 1, 1000, 80, None);

    let result = engine.analyze_experiment(exp.id).unwrap();
    let treatment = result.variant(exp.variants[1].id).unwrap();
    let lift = treatment.lift.unwrap();
    assert!(lift.excludes_zero());
    assert!(lift.interval.lower > 0.0);
    assert!(result.min_sample_reached);
    assert!(!result.sample_ratio.mismatch_detected);
    // Analysis is read-only
    assert_eq!(
        engine.selection_phase(exp.id).unwrap(),
        SelectionPhase::AwaitingSignificance
    );

    let evaluation = engine.evaluate(exp.id).unwrap();
    assert_eq!(
        evaluation.action,
        RecommendedAction::SelectWinner {
            variant_id: exp.variants[1].id
        }
    );

    let done = engine.select_winner_and_complete(exp.id, None).unwrap();
    assert_eq!(done.status, ExperimentStatus::Completed);
    assert_eq!(done.winning_variant_id, Some(exp.variants[1].id));
    assert_eq!(
        engine.selection_phase(exp.id).unwrap(),
        SelectionPhase::WinnerSelected {
            variant_id: exp.variants[1].id
        }
    );
}

#[test]
fn test_no_separation_never_selects() {
    let engine = ExperimentEngine::new(EngineConfig::default());
    for strategy in [
        WinnerStrategy::Immediate,
        WinnerStrategy::Conservative,
        WinnerStrategy::Economic,
        WinnerStrategy::SafetyFirst,
    ] {
        let exp = running_experiment(&engine, strategy.as_str(), strategy, &[50, 50]);
        feed(&engine, &exp, 0, 500, 50, None);
        feed(&engine, &exp, 1, 500, 50, None);

        let evaluation = engine.evaluate(exp.id).unwrap();
        assert!(
            matches!(
                evaluation.action,
                RecommendedAction::Continue | RecommendedAction::NeedsMoreData { .. }
            ),
            "{strategy:?} recommended {:?}",
            evaluation.action
        );
        assert_eq!(
            engine.select_winner_and_complete(exp.id, None).unwrap_err().code(),
            "INSUFFICIENT_DATA"
        );
        assert_eq!(
            engine.get_experiment(exp.id).unwrap().status,
            ExperimentStatus::Running
        );
    }
}

#[test]
fn test_conservative_waits_out_confirmation_window() {
    let engine = ExperimentEngine::new(EngineConfig::default());
    let conservative =
        running_experiment(&engine, "conservative", WinnerStrategy::Conservative, &[50, 50]);
    let immediate = running_experiment(&engine, "immediate", WinnerStrategy::Immediate, &[50, 50]);

    // Significance first crossed at exactly the minimum sample
    for exp in [&conservative, &immediate] {
        feed(&engine, exp, 0, 100, 5, None);
        feed(&engine, exp, 1, 100, 20, None);
    }

    let at_crossing = engine.evaluate(conservative.id).unwrap();
    assert_eq!(at_crossing.action, RecommendedAction::Continue);
    assert!(matches!(
        at_crossing.phase,
        SelectionPhase::Confirming {
            since_impressions: 100,
            ..
        }
    ));

    let winner = immediate.variants[1].id;
    assert_eq!(
        engine.evaluate(immediate.id).unwrap().action,
        RecommendedAction::SelectWinner { variant_id: winner }
    );

    // Control catches up before 1.5x the minimum sample
    feed(&engine, &conservative, 0, 20, 15, None);
    feed(&engine, &conservative, 1, 20, 0, None);

    let reverted = engine.evaluate(conservative.id).unwrap();
    assert_eq!(reverted.action, RecommendedAction::Continue);
    assert_eq!(reverted.phase, SelectionPhase::AwaitingSignificance);
    assert_eq!(
        engine
            .select_winner_and_complete(conservative.id, None)
            .unwrap_err()
            .code(),
        "INSUFFICIENT_DATA"
    );

    let done = engine.select_winner_and_complete(immediate.id, None).unwrap();
    assert_eq!(done.winning_variant_id, Some(winner));
}

#[test]
fn test_conservative_selects_after_window_holds() {
    let engine = ExperimentEngine::new(EngineConfig::default());
    let exp = running_experiment(&engine, "holds", WinnerStrategy::Conservative, &[50, 50]);

    feed(&engine, &exp, 0, 100, 5, None);
    feed(&engine, &exp, 1, 100, 20, None);
    assert_eq!(engine.evaluate(exp.id).unwrap().action, RecommendedAction::Continue);

    feed(&engine, &exp, 0, 50, 3, None);
    feed(&engine, &exp, 1, 50, 10, None);
    let evaluation = engine.evaluate(exp.id).unwrap();
    assert_eq!(
        evaluation.action,
        RecommendedAction::SelectWinner {
            variant_id: exp.variants[1].id
        }
    );
}

#[test]
fn test_conservative_late_first_evaluation_does_not_select() {
    let engine = ExperimentEngine::new(EngineConfig::default());
    let exp = running_experiment(&engine, "late", WinnerStrategy::Conservative, &[50, 50]);

    // Already past 1.5x the minimum sample when the scheduler first looks
    feed(&engine, &exp, 0, 150, 8, None);
    feed(&engine, &exp, 1, 150, 30, None);

    let first = engine.evaluate(exp.id).unwrap();
    assert_eq!(first.action, RecommendedAction::Continue);
    assert!(matches!(
        first.phase,
        SelectionPhase::Confirming {
            since_impressions: 150,
            ..
        }
    ));
    assert_eq!(
        engine.select_winner_and_complete(exp.id, None).unwrap_err().code(),
        "INSUFFICIENT_DATA"
    );

    feed(&engine, &exp, 0, 50, 3, None);
    feed(&engine, &exp, 1, 50, 10, None);
    let confirmed = engine.evaluate(exp.id).unwrap();
    assert_eq!(
        confirmed.action,
        RecommendedAction::SelectWinner {
            variant_id: exp.variants[1].id
        }
    );
    let done = engine.select_winner_and_complete(exp.id, None).unwrap();
    assert_eq!(done.winning_variant_id, Some(exp.variants[1].id));
}

#[test]
fn test_needs_more_data_reports_remaining_sample() {
    let engine = ExperimentEngine::new(EngineConfig::default());
    let exp = running_experiment(&engine, "early", WinnerStrategy::Immediate, &[50, 50]);
    feed(&engine, &exp, 0, 40, 2, None);
    feed(&engine, &exp, 1, 60, 6, None);

    match engine.evaluate(exp.id).unwrap().action {
        RecommendedAction::NeedsMoreData {
            remaining_per_variant,
            estimated_remaining_total,
            ..
        } => {
            assert_eq!(remaining_per_variant, 60);
            assert_eq!(estimated_remaining_total, 120);
        }
        other => panic!("expected needs_more_data, got {other:?}"),
    }
}

#[test]
fn test_safety_first_needs_double_sample() {
    let engine = ExperimentEngine::new(EngineConfig::default());
    let exp = running_experiment(&engine, "safety", WinnerStrategy::SafetyFirst, &[50, 50]);
    feed(&engine, &exp, 0, 150, 8, None);
    feed(&engine, &exp, 1, 150, 40, None);

    let result = engine.analyze_experiment(exp.id).unwrap();
    assert_eq!(result.sample_target, 200);
    assert!((result.comparison_confidence - 0.99).abs() < 1e-12);
    assert!(matches!(
        engine.evaluate(exp.id).unwrap().action,
        RecommendedAction::NeedsMoreData { .. }
    ));

    feed(&engine, &exp, 0, 50, 2, None);
    feed(&engine, &exp, 1, 50, 13, None);
    assert_eq!(
        engine.evaluate(exp.id).unwrap().action,
        RecommendedAction::SelectWinner {
            variant_id: exp.variants[1].id
        }
    );
}

#[test]
fn test_economic_requires_higher_value_per_impression() {
    let engine = ExperimentEngine::new(EngineConfig::default());
    let exp = running_experiment(&engine, "economic", WinnerStrategy::Economic, &[50, 50]);
    // Treatment converts more often but on cheaper orders
    feed(&engine, &exp, 0, 1000, 50, Some(100.0));
    feed(&engine, &exp, 1, 1000, 80, Some(20.0));

    let result = engine.analyze_experiment(exp.id).unwrap();
    assert!(result.variants[1].lift.unwrap().excludes_zero());
    assert!(result.variants[1].value_per_impression < result.variants[0].value_per_impression);
    assert_eq!(engine.evaluate(exp.id).unwrap().action, RecommendedAction::Continue);
}

#[test]
fn test_three_variants_pick_highest_lift() {
    let engine = ExperimentEngine::new(EngineConfig::default());
    let exp = running_experiment(&engine, "three-way", WinnerStrategy::Immediate, &[34, 33, 33]);
    feed(&engine, &exp, 0, 1000, 50, None);
    feed(&engine, &exp, 1, 1000, 90, None);
    feed(&engine, &exp, 2, 1000, 110, None);

    let result = engine.analyze_experiment(exp.id).unwrap();
    let anova = result.anova.unwrap();
    assert!(anova.p_value < 0.001);
    assert!(result.omnibus_passed);
    // Two pairwise comparisons share the 5% error budget
    assert!((result.comparison_confidence - 0.975).abs() < 1e-12);

    assert_eq!(
        engine.evaluate(exp.id).unwrap().action,
        RecommendedAction::SelectWinner {
            variant_id: exp.variants[2].id
        }
    );
}

#[test]
fn test_sequential_annotation() {
    let engine = ExperimentEngine::new(EngineConfig::default());
    let exp = engine
        .create_experiment(
            engine
                .new_experiment("workspace-1", "sequential")
                .sequential(SprtConfig::default())
                .variant(NewVariant::control("control", 50))
                .variant(NewVariant::treatment("treatment", 50))
                .build(),
        )
        .unwrap();
    engine.start_experiment(exp.id).unwrap();
    feed(&engine, &exp, 0, 1000, 50, None);
    feed(&engine, &exp, 1, 1000, 80, None);

    let result = engine.analyze_experiment(exp.id).unwrap();
    assert!(result.variants[0].sequential.is_none());
    let outcome = result.variants[1].sequential.unwrap();
    assert!(outcome.log_likelihood_ratio >= outcome.upper_bound);
}

#[test]
fn test_paused_experiment_can_be_evaluated_and_completed() {
    let engine = ExperimentEngine::new(EngineConfig::default());
    let exp = running_experiment(&engine, "paused", WinnerStrategy::Immediate, &[50, 50]);
    feed(&engine, &exp, 0, 1000, 50, None);
    feed(&engine, &exp, 1, 1000, 80, None);
    engine.pause_experiment(exp.id).unwrap();

    assert!(engine.evaluate(exp.id).unwrap().action.winner().is_some());
    // Scheduler hook only acts on running experiments
    assert!(engine.apply_if_ready(exp.id).unwrap().is_none());

    let done = engine.select_winner_and_complete(exp.id, None).unwrap();
    assert_eq!(done.winning_variant_id, Some(exp.variants[1].id));
}
