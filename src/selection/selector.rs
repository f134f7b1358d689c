//! Winner selector
//!
//! Keeps the selection phase per experiment and turns evaluations into
//! completions. Evaluation and completion for one experiment are serialized
//! by a per-experiment mutex; the store's conditional `Completed` transition
//! covers callers in other processes.
//!
//! Phases of running experiments live in this selector only. Engines sharing
//! a store agree on the recorded winner, but each confirms the Conservative
//! window from its own evaluations. Entries are dropped once an experiment
//! is completed or archived; its phase then derives from the stored winner.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::strategy::SelectionPhase;
use crate::analysis::{analyze, AnalysisOptions, ExperimentResult, RecommendedAction};
use crate::errors::{EngineError, Result};
use crate::experiment::manager::ExperimentManager;
use crate::experiment::types::{Experiment, ExperimentStatus};
use crate::metrics::{EVALUATIONS_TOTAL, WINNER_SELECTIONS_TOTAL};

/// Outcome of one evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub experiment_id: Uuid,
    pub action: RecommendedAction,
    pub phase: SelectionPhase,
    pub result: ExperimentResult,
}

pub struct WinnerSelector {
    manager: Arc<ExperimentManager>,
    options: AnalysisOptions,
    phases: DashMap<Uuid, SelectionPhase>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl WinnerSelector {
    pub fn new(manager: Arc<ExperimentManager>, options: AnalysisOptions) -> Self {
        Self {
            manager,
            options,
            phases: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop per-experiment state once nothing can advance it
    pub fn forget(&self, id: Uuid) {
        self.phases.remove(&id);
        self.locks.remove(&id);
    }

    fn forget_if_final(&self, experiment: &Experiment) {
        if matches!(
            experiment.status,
            ExperimentStatus::Completed | ExperimentStatus::Archived
        ) {
            self.forget(experiment.id);
        }
    }

    fn current_phase(&self, experiment: &Experiment) -> SelectionPhase {
        if let Some(variant_id) = experiment.winning_variant_id {
            return SelectionPhase::WinnerSelected { variant_id };
        }
        self.phases
            .get(&experiment.id)
            .map(|phase| *phase)
            .unwrap_or_default()
    }

    /// Current selection phase of an experiment
    pub fn phase(&self, id: Uuid) -> Result<SelectionPhase> {
        let experiment = self.manager.get(id)?;
        Ok(self.current_phase(&experiment))
    }

    /// Result snapshot in any status; does not advance the selection phase
    pub fn analyze(&self, id: Uuid) -> Result<ExperimentResult> {
        let experiment = self.manager.get(id)?;
        Ok(analyze(&experiment, &self.options, self.current_phase(&experiment)))
    }

    /// Evaluate a running or paused experiment against its strategy,
    /// advancing its selection phase
    pub fn evaluate(&self, id: Uuid) -> Result<Evaluation> {
        let lock = self.lock_for(id);
        let _guard = lock.lock();
        let experiment = self.manager.get(id)?;
        self.forget_if_final(&experiment);
        self.evaluate_locked(&experiment)
    }

    fn evaluate_locked(&self, experiment: &Experiment) -> Result<Evaluation> {
        if !matches!(
            experiment.status,
            ExperimentStatus::Running | ExperimentStatus::Paused
        ) {
            return Err(EngineError::InvalidState {
                id: experiment.id,
                status: experiment.status,
                operation: "evaluate",
            });
        }

        let previous = self.current_phase(experiment);
        let result = analyze(experiment, &self.options, previous);
        self.phases.insert(experiment.id, result.phase);

        EVALUATIONS_TOTAL
            .with_label_values(&[result.recommended_action.as_str()])
            .inc();
        if previous != result.phase {
            debug!(
                experiment_id = %experiment.id,
                from = previous.as_str(),
                to = result.phase.as_str(),
                "Selection phase changed"
            );
        }

        Ok(Evaluation {
            experiment_id: experiment.id,
            action: result.recommended_action,
            phase: result.phase,
            result,
        })
    }

    /// Complete an experiment with `override_winner`, or with the current
    /// recommendation when no override is given
    ///
    /// Repeat calls on a completed experiment return it unchanged, unless the
    /// override names a different winner than the one recorded.
    pub fn select_winner_and_complete(
        &self,
        id: Uuid,
        override_winner: Option<Uuid>,
    ) -> Result<Experiment> {
        let lock = self.lock_for(id);
        let _guard = lock.lock();
        let experiment = self.manager.get(id)?;
        self.forget_if_final(&experiment);

        match experiment.status {
            ExperimentStatus::Completed => return recorded_outcome(experiment, override_winner),
            ExperimentStatus::Running | ExperimentStatus::Paused => {}
            status => {
                return Err(EngineError::InvalidState {
                    id,
                    status,
                    operation: "select a winner for",
                })
            }
        }

        let (winner, source) = match override_winner {
            Some(variant_id) => {
                if experiment.variant(variant_id).is_none() {
                    return Err(EngineError::variant_not_found(variant_id));
                }
                (variant_id, "override")
            }
            None => {
                let evaluation = self.evaluate_locked(&experiment)?;
                match evaluation.action.winner() {
                    Some(variant_id) => (variant_id, "recommendation"),
                    None => {
                        return Err(EngineError::InsufficientData(format!(
                            "no variant satisfies the {} strategy yet (recommended action: {})",
                            experiment.strategy.as_str(),
                            evaluation.action.as_str()
                        )))
                    }
                }
            }
        };

        self.complete_locked(id, winner, override_winner, source)
    }

    /// Scheduler hook: evaluate and, when the experiment opts in to
    /// `auto_apply_winner` and a winner is recommended, complete it
    ///
    /// Returns the completed experiment, or `None` when nothing was applied.
    pub fn apply_if_ready(&self, id: Uuid) -> Result<Option<Experiment>> {
        let lock = self.lock_for(id);
        let _guard = lock.lock();
        let experiment = self.manager.get(id)?;
        self.forget_if_final(&experiment);

        if experiment.status != ExperimentStatus::Running {
            return Ok(None);
        }

        let evaluation = self.evaluate_locked(&experiment)?;
        match evaluation.action.winner() {
            Some(winner) if experiment.auto_apply_winner => self
                .complete_locked(id, winner, None, "auto_apply")
                .map(Some),
            _ => Ok(None),
        }
    }

    fn complete_locked(
        &self,
        id: Uuid,
        winner: Uuid,
        override_winner: Option<Uuid>,
        source: &'static str,
    ) -> Result<Experiment> {
        match self.manager.complete(id, Some(winner)) {
            Ok(completed) => {
                self.forget(id);
                WINNER_SELECTIONS_TOTAL.with_label_values(&[source]).inc();
                info!(
                    experiment_id = %id,
                    winner = %winner,
                    source,
                    "Winner selected"
                );
                Ok(completed)
            }
            Err(EngineError::InvalidState {
                status: ExperimentStatus::Completed,
                ..
            }) => {
                // Completed by another engine instance between our read and write
                self.forget(id);
                recorded_outcome(self.manager.get(id)?, override_winner)
            }
            Err(e) => Err(e),
        }
    }
}

fn recorded_outcome(experiment: Experiment, override_winner: Option<Uuid>) -> Result<Experiment> {
    match override_winner {
        Some(requested) if experiment.winning_variant_id != Some(requested) => {
            Err(EngineError::ConcurrentCompletion {
                id: experiment.id,
                recorded_winner: experiment.winning_variant_id,
            })
        }
        _ => Ok(experiment),
    }
}
