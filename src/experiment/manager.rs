//! Experiment lifecycle management
//!
//! Every status change goes through a conditional store update, so two callers
//! racing on the same experiment cannot both win a transition.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::storage::{ExperimentStore, StatusChange, Transition};
use super::types::{
    AuditNote, Experiment, ExperimentStatus, ExperimentSummary, NewExperiment, Variant,
    VariantCounters,
};
use crate::adapters::AdapterRegistry;
use crate::errors::{EngineError, Result, StoreError, ValidationErrorExt};
use crate::metrics::EXPERIMENT_TRANSITIONS_TOTAL;
use crate::validation;

/// Manager for experiment records and their lifecycle
pub struct ExperimentManager {
    store: Arc<dyn ExperimentStore>,
    adapters: Arc<AdapterRegistry>,
}

impl ExperimentManager {
    /// Manager with the built-in content adapters
    pub fn new(store: Arc<dyn ExperimentStore>) -> Self {
        Self::with_adapters(store, Arc::new(AdapterRegistry::new()))
    }

    pub fn with_adapters(store: Arc<dyn ExperimentStore>, adapters: Arc<AdapterRegistry>) -> Self {
        Self { store, adapters }
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// Validate a definition and persist it, with its variants, in `Draft`
    pub fn create(&self, spec: NewExperiment) -> Result<Experiment> {
        validation::validate_name(&spec.scope_id).map_validation_err("scope_id")?;
        validation::validate_name(&spec.name).map_validation_err("name")?;
        validation::validate_hypothesis(&spec.hypothesis).map_validation_err("hypothesis")?;
        validation::validate_name(&spec.content_type).map_validation_err("content_type")?;
        validation::validate_significance_level(spec.significance_level)
            .map_validation_err("significance_level")?;
        validation::validate_min_sample_size(spec.min_sample_size)
            .map_validation_err("min_sample_size")?;
        validation::validate_variants(&spec.variants).map_validation_err("variants")?;

        for variant in &spec.variants {
            self.adapters
                .validate(&spec.content_type, &variant.content)
                .map_err(|e| {
                    EngineError::validation(
                        "variants.content",
                        format!("variant '{}': {e}", variant.name),
                    )
                })?;
        }

        if let Some(sprt) = &spec.sequential {
            if !(sprt.alpha > 0.0 && sprt.alpha < 1.0 && sprt.beta > 0.0 && sprt.beta < 1.0) {
                return Err(EngineError::validation(
                    "sequential",
                    "alpha and beta must be strictly between 0 and 1",
                ));
            }
            if !(sprt.minimum_detectable_effect.is_finite() && sprt.minimum_detectable_effect > 0.0)
            {
                return Err(EngineError::validation(
                    "sequential",
                    "minimum_detectable_effect must be positive",
                ));
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let variants = spec
            .variants
            .into_iter()
            .map(|v| Variant {
                id: Uuid::new_v4(),
                experiment_id: id,
                name: v.name,
                content: v.content,
                is_control: v.is_control,
                split_percent: v.split_percent,
                counters: VariantCounters::default(),
                created_at: now,
            })
            .collect();

        let experiment = Experiment {
            id,
            scope_id: spec.scope_id,
            name: spec.name,
            hypothesis: spec.hypothesis,
            content_type: spec.content_type,
            status: ExperimentStatus::Draft,
            significance_level: spec.significance_level,
            min_sample_size: spec.min_sample_size,
            strategy: spec.strategy,
            auto_apply_winner: spec.auto_apply_winner,
            bayesian_enabled: spec.bayesian_enabled,
            sequential: spec.sequential,
            variants,
            winning_variant_id: None,
            audit_notes: Vec::new(),
            created_at: now,
            started_at: None,
            completed_at: None,
        };

        self.store.insert(experiment.clone())?;
        info!(
            experiment_id = %id,
            scope_id = %experiment.scope_id,
            variants = experiment.variants.len(),
            strategy = experiment.strategy.as_str(),
            "Experiment created"
        );
        Ok(experiment)
    }

    /// `Draft -> Running`
    pub fn start(&self, id: Uuid) -> Result<Experiment> {
        self.transition(id, "start", &[ExperimentStatus::Draft], ExperimentStatus::Running, None)
    }

    /// `Running -> Paused`
    pub fn pause(&self, id: Uuid) -> Result<Experiment> {
        self.transition(id, "pause", &[ExperimentStatus::Running], ExperimentStatus::Paused, None)
    }

    /// `Paused -> Running`
    pub fn resume(&self, id: Uuid) -> Result<Experiment> {
        self.transition(id, "resume", &[ExperimentStatus::Paused], ExperimentStatus::Running, None)
    }

    /// `Running | Paused -> Completed`, recording the winner if one is given
    pub fn complete(&self, id: Uuid, winning_variant_id: Option<Uuid>) -> Result<Experiment> {
        if let Some(winner) = winning_variant_id {
            let experiment = self.get(id)?;
            if experiment.variant(winner).is_none() {
                return Err(EngineError::variant_not_found(winner));
            }
        }
        self.transition(
            id,
            "complete",
            &[ExperimentStatus::Running, ExperimentStatus::Paused],
            ExperimentStatus::Completed,
            winning_variant_id,
        )
    }

    /// `Draft | Completed -> Archived`
    pub fn archive(&self, id: Uuid) -> Result<Experiment> {
        self.transition(
            id,
            "archive",
            &[ExperimentStatus::Draft, ExperimentStatus::Completed],
            ExperimentStatus::Archived,
            None,
        )
    }

    /// Append an audit note; allowed in every status
    pub fn annotate(&self, id: Uuid, note: &str) -> Result<Experiment> {
        validation::validate_hypothesis(note).map_validation_err("note")?;
        self.store
            .add_audit_note(
                id,
                AuditNote {
                    at: Utc::now(),
                    note: note.to_string(),
                },
            )
            .map_err(|e| not_found_as(id, e))?;
        self.get(id)
    }

    pub fn get(&self, id: Uuid) -> Result<Experiment> {
        self.store
            .get(id)?
            .ok_or_else(|| EngineError::experiment_not_found(id))
    }

    /// All experiments, optionally restricted to one scope, oldest first
    pub fn list(&self, scope_id: Option<&str>) -> Result<Vec<Experiment>> {
        let mut experiments = self.store.list()?;
        if let Some(scope) = scope_id {
            experiments.retain(|e| e.scope_id == scope);
        }
        Ok(experiments)
    }

    pub fn list_by_status(&self, status: ExperimentStatus) -> Result<Vec<Experiment>> {
        let mut experiments = self.store.list()?;
        experiments.retain(|e| e.status == status);
        Ok(experiments)
    }

    /// Experiment counts per status
    pub fn summary(&self) -> Result<ExperimentSummary> {
        let mut summary = ExperimentSummary::default();
        for experiment in self.store.list()? {
            summary.total += 1;
            match experiment.status {
                ExperimentStatus::Draft => summary.draft += 1,
                ExperimentStatus::Running => summary.running += 1,
                ExperimentStatus::Paused => summary.paused += 1,
                ExperimentStatus::Completed => summary.completed += 1,
                ExperimentStatus::Archived => summary.archived += 1,
            }
        }
        Ok(summary)
    }

    fn transition(
        &self,
        id: Uuid,
        operation: &'static str,
        expected: &[ExperimentStatus],
        to: ExperimentStatus,
        winning_variant_id: Option<Uuid>,
    ) -> Result<Experiment> {
        let change = StatusChange {
            to,
            at: Utc::now(),
            winning_variant_id,
        };

        match self
            .store
            .transition(id, expected, change)
            .map_err(|e| not_found_as(id, e))?
        {
            Transition::Applied(experiment) => {
                EXPERIMENT_TRANSITIONS_TOTAL
                    .with_label_values(&[to.as_str()])
                    .inc();
                info!(
                    experiment_id = %id,
                    operation,
                    status = to.as_str(),
                    winner = ?experiment.winning_variant_id,
                    "Experiment status changed"
                );
                Ok(experiment)
            }
            Transition::Rejected(current) => Err(EngineError::InvalidState {
                id,
                status: current.status,
                operation,
            }),
        }
    }
}

fn not_found_as(id: Uuid, err: StoreError) -> EngineError {
    match err {
        StoreError::NotFound(_) => EngineError::experiment_not_found(id),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::storage::MemoryStore;
    use crate::experiment::types::NewVariant;
    use serde_json::json;

    fn manager() -> ExperimentManager {
        ExperimentManager::new(Arc::new(MemoryStore::new()))
    }

    fn spec() -> NewExperiment {
        NewExperiment::builder("workspace-1", "checkout button")
            .hypothesis("Green converts better")
            .variant(NewVariant::control("blue", 50).with_content(json!({"color": "blue"})))
            .variant(NewVariant::treatment("green", 50).with_content(json!({"color": "green"})))
            .build()
    }

    #[test]
    fn test_create_persists_draft() {
        let manager = manager();
        let exp = manager.create(spec()).unwrap();
        assert_eq!(exp.status, ExperimentStatus::Draft);
        assert_eq!(exp.variants.len(), 2);
        assert!(exp.variants.iter().all(|v| v.experiment_id == exp.id));
        assert_eq!(manager.get(exp.id).unwrap(), exp);
    }

    #[test]
    fn test_create_rejects_bad_significance() {
        let manager = manager();
        let mut bad = spec();
        bad.significance_level = 1.0;
        let err = manager.create(bad).unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "significance_level"));
    }

    #[test]
    fn test_create_validates_content_through_adapter() {
        let manager = manager();
        let bad = NewExperiment::builder("workspace-1", "copy test")
            .content_type("text")
            .variant(NewVariant::control("a", 50).with_content(json!("Buy now")))
            .variant(NewVariant::treatment("b", 50).with_content(json!(42)))
            .build();
        let err = manager.create(bad).unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "variants.content"));
    }

    #[test]
    fn test_lifecycle() {
        let manager = manager();
        let id = manager.create(spec()).unwrap().id;

        let running = manager.start(id).unwrap();
        assert!(running.started_at.is_some());
        manager.pause(id).unwrap();
        manager.resume(id).unwrap();

        let winner = running.variants[1].id;
        let done = manager.complete(id, Some(winner)).unwrap();
        assert_eq!(done.status, ExperimentStatus::Completed);
        assert_eq!(done.winning_variant_id, Some(winner));
        assert!(done.completed_at.is_some());

        assert_eq!(manager.archive(id).unwrap().status, ExperimentStatus::Archived);
    }

    #[test]
    fn test_invalid_transitions() {
        let manager = manager();
        let id = manager.create(spec()).unwrap().id;

        let err = manager.pause(id).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidState {
                status: ExperimentStatus::Draft,
                operation: "pause",
                ..
            }
        ));
        assert!(manager.complete(id, None).is_err());

        manager.start(id).unwrap();
        assert!(manager.start(id).is_err());
        manager.complete(id, None).unwrap();
        assert!(manager.resume(id).is_err());
        assert!(manager.complete(id, None).is_err());
    }

    #[test]
    fn test_complete_rejects_foreign_winner() {
        let manager = manager();
        let id = manager.create(spec()).unwrap().id;
        manager.start(id).unwrap();
        let err = manager.complete(id, Some(Uuid::new_v4())).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(manager.get(id).unwrap().status, ExperimentStatus::Running);
    }

    #[test]
    fn test_annotate_after_completion() {
        let manager = manager();
        let id = manager.create(spec()).unwrap().id;
        manager.start(id).unwrap();
        manager.complete(id, None).unwrap();
        let exp = manager.annotate(id, "Shipped green to 100%").unwrap();
        assert_eq!(exp.audit_notes.len(), 1);
        assert_eq!(exp.status, ExperimentStatus::Completed);
    }

    #[test]
    fn test_list_and_summary() {
        let manager = manager();
        let a = manager.create(spec()).unwrap().id;
        let mut other = spec();
        other.scope_id = "workspace-2".to_string();
        manager.create(other).unwrap();
        manager.start(a).unwrap();

        assert_eq!(manager.list(None).unwrap().len(), 2);
        assert_eq!(manager.list(Some("workspace-2")).unwrap().len(), 1);
        assert_eq!(manager.list_by_status(ExperimentStatus::Running).unwrap().len(), 1);

        let summary = manager.summary().unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.running, 1);
        assert_eq!(summary.draft, 1);
    }

    #[test]
    fn test_unknown_experiment() {
        let manager = manager();
        assert_eq!(manager.start(Uuid::new_v4()).unwrap_err().code(), "NOT_FOUND");
        assert_eq!(manager.get(Uuid::new_v4()).unwrap_err().code(), "NOT_FOUND");
    }
}
