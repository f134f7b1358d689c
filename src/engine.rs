//! Engine facade
//!
//! `ExperimentEngine` wires the manager, tracker and selector over one store
//! and exposes the operations an embedding service calls. Several engines may
//! share one store: counters, transitions and the recorded winner stay
//! consistent across them, while Conservative confirmation progress is kept
//! per engine.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::adapters::AdapterRegistry;
use crate::analysis::{AnalysisOptions, ExperimentResult};
use crate::config::EngineConfig;
use crate::errors::{EngineError, Result, ValidationErrorExt};
use crate::experiment::assignment;
use crate::experiment::manager::ExperimentManager;
use crate::experiment::storage::{ExperimentStore, MemoryStore};
use crate::experiment::tracker::{EventTracker, TrackOutcome};
use crate::experiment::types::{
    Event, Experiment, ExperimentStatus, ExperimentSummary, NewExperiment, NewExperimentBuilder,
    TrackEvent, Variant, VariantCounters,
};
use crate::metrics;
use crate::selection::{Evaluation, SelectionPhase, WinnerSelector};
use crate::validation;

pub struct ExperimentEngine {
    config: EngineConfig,
    manager: Arc<ExperimentManager>,
    tracker: EventTracker,
    selector: WinnerSelector,
}

impl ExperimentEngine {
    /// Engine over a fresh in-memory store with the built-in adapters
    pub fn new(config: EngineConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: EngineConfig, store: Arc<dyn ExperimentStore>) -> Self {
        Self::with_parts(config, store, AdapterRegistry::new())
    }

    pub fn with_parts(
        config: EngineConfig,
        store: Arc<dyn ExperimentStore>,
        adapters: AdapterRegistry,
    ) -> Self {
        if let Err(e) = metrics::register_metrics() {
            warn!(error = %e, "Failed to register experiment metrics");
        }
        let manager = Arc::new(ExperimentManager::with_adapters(
            Arc::clone(&store),
            Arc::new(adapters),
        ));
        let tracker = EventTracker::new(store, config.clone());
        let selector = WinnerSelector::new(Arc::clone(&manager), AnalysisOptions::from(&config));
        Self {
            config,
            manager,
            tracker,
            selector,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn manager(&self) -> &ExperimentManager {
        &self.manager
    }

    // ==========================================================================
    // Lifecycle
    // ==========================================================================

    /// Experiment builder pre-filled with the configured defaults
    pub fn new_experiment(&self, scope_id: &str, name: &str) -> NewExperimentBuilder {
        self.config.experiment_builder(scope_id, name)
    }

    pub fn create_experiment(&self, spec: NewExperiment) -> Result<Experiment> {
        self.manager.create(spec)
    }

    pub fn start_experiment(&self, id: Uuid) -> Result<Experiment> {
        self.manager.start(id)
    }

    pub fn pause_experiment(&self, id: Uuid) -> Result<Experiment> {
        self.manager.pause(id)
    }

    pub fn resume_experiment(&self, id: Uuid) -> Result<Experiment> {
        self.manager.resume(id)
    }

    /// Complete without a winner, or with an explicitly chosen one
    ///
    /// Prefer [`Self::select_winner_and_complete`], which is idempotent.
    pub fn complete_experiment(&self, id: Uuid, winner: Option<Uuid>) -> Result<Experiment> {
        self.manager.complete(id, winner)
    }

    pub fn archive_experiment(&self, id: Uuid) -> Result<Experiment> {
        let archived = self.manager.archive(id)?;
        self.selector.forget(id);
        Ok(archived)
    }

    pub fn annotate_experiment(&self, id: Uuid, note: &str) -> Result<Experiment> {
        self.manager.annotate(id, note)
    }

    pub fn get_experiment(&self, id: Uuid) -> Result<Experiment> {
        self.manager.get(id)
    }

    pub fn list_experiments(&self, scope_id: Option<&str>) -> Result<Vec<Experiment>> {
        self.manager.list(scope_id)
    }

    pub fn list_experiments_by_status(&self, status: ExperimentStatus) -> Result<Vec<Experiment>> {
        self.manager.list_by_status(status)
    }

    pub fn summary(&self) -> Result<ExperimentSummary> {
        self.manager.summary()
    }

    // ==========================================================================
    // Traffic
    // ==========================================================================

    /// Deterministic variant for a unit of a running experiment
    pub fn assign_variant(&self, experiment_id: Uuid, unit_id: &str) -> Result<Variant> {
        validation::validate_visitor_id(unit_id).map_validation_err("unit_id")?;
        let experiment = self.manager.get(experiment_id)?;
        assignment::assign(&experiment, unit_id).cloned()
    }

    pub fn track_event(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        event: TrackEvent,
    ) -> Result<TrackOutcome> {
        self.tracker.record(experiment_id, variant_id, event)
    }

    pub fn events(&self, experiment_id: Uuid) -> Result<Vec<Event>> {
        self.tracker.events(experiment_id)
    }

    /// Counters recomputed from the event log
    pub fn replay_events(&self, experiment_id: Uuid) -> Result<HashMap<Uuid, VariantCounters>> {
        self.tracker.replay(experiment_id)
    }

    /// Variant content rendered through the experiment's content adapter
    pub fn render_variant(&self, experiment_id: Uuid, variant_id: Uuid) -> Result<Value> {
        let experiment = self.manager.get(experiment_id)?;
        let variant = experiment
            .variant(variant_id)
            .ok_or_else(|| EngineError::variant_not_found(variant_id))?;
        self.manager
            .adapters()
            .render(&experiment.content_type, &variant.content)
            .map_err(|e| EngineError::Adapter(e.to_string()))
    }

    // ==========================================================================
    // Analysis and selection
    // ==========================================================================

    pub fn analyze_experiment(&self, id: Uuid) -> Result<ExperimentResult> {
        self.selector.analyze(id)
    }

    pub fn evaluate(&self, id: Uuid) -> Result<Evaluation> {
        self.selector.evaluate(id)
    }

    pub fn selection_phase(&self, id: Uuid) -> Result<SelectionPhase> {
        self.selector.phase(id)
    }

    pub fn select_winner_and_complete(
        &self,
        id: Uuid,
        override_winner: Option<Uuid>,
    ) -> Result<Experiment> {
        self.selector.select_winner_and_complete(id, override_winner)
    }

    /// Complete with the recommended winner when the experiment opts in
    pub fn apply_if_ready(&self, id: Uuid) -> Result<Option<Experiment>> {
        self.selector.apply_if_ready(id)
    }
}

impl Default for ExperimentEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
