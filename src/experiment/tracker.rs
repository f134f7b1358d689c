//! Event ingestion
//!
//! Order of effects for one event:
//! 1. claim the idempotency key, if any
//! 2. atomically increment the variant's counters (retried on transient errors)
//! 3. append the event to the audit log, best effort
//!
//! Counters are authoritative for analysis. The log exists for audit and
//! reconciliation, so a failed append is reported but never fails the call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::storage::{ExperimentStore, IdempotencyKey};
use super::types::{
    CounterDelta, Event, EventType, ExperimentStatus, TrackEvent, VariantCounters,
};
use crate::config::EngineConfig;
use crate::errors::{EngineError, Result, StoreError, ValidationErrorExt};
use crate::metrics::{AUDIT_APPEND_FAILURES_TOTAL, EVENTS_TRACKED_TOTAL, EVENT_RETRIES_TOTAL};
use crate::validation;

/// Result of tracking one event
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    /// Counters updated; the event as recorded
    Recorded(Event),
    /// Idempotency key seen before; nothing changed
    Duplicate,
}

impl TrackOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

pub struct EventTracker {
    store: Arc<dyn ExperimentStore>,
    config: EngineConfig,
}

impl EventTracker {
    pub fn new(store: Arc<dyn ExperimentStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Record an outcome event against a variant of a running experiment
    pub fn record(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        event: TrackEvent,
    ) -> Result<TrackOutcome> {
        let label = event.event_type.metric_label();
        let result = self.record_inner(experiment_id, variant_id, event);

        let outcome = match &result {
            Ok(TrackOutcome::Recorded(_)) => "recorded",
            Ok(TrackOutcome::Duplicate) => "duplicate",
            Err(_) => "error",
        };
        EVENTS_TRACKED_TOTAL
            .with_label_values(&[label, outcome])
            .inc();

        result
    }

    fn record_inner(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        event: TrackEvent,
    ) -> Result<TrackOutcome> {
        validation::validate_visitor_id(&event.visitor_id).map_validation_err("visitor_id")?;
        validation::validate_event_value(event.value).map_validation_err("value")?;
        validation::validate_metadata(&event.metadata).map_validation_err("metadata")?;

        let experiment = self
            .store
            .get(experiment_id)?
            .ok_or_else(|| EngineError::experiment_not_found(experiment_id))?;

        if experiment.status != ExperimentStatus::Running {
            return Err(EngineError::InvalidState {
                id: experiment_id,
                status: experiment.status,
                operation: "track events for",
            });
        }
        if experiment.variant(variant_id).is_none() {
            return Err(EngineError::variant_not_found(variant_id));
        }

        let claim = match &event.idempotency_key {
            Some(key) => {
                let claim = IdempotencyKey {
                    variant_id,
                    visitor_id: event.visitor_id.clone(),
                    event_type: event.event_type.clone(),
                    key: key.clone(),
                };
                if !self.store.claim_idempotency_key(&claim)? {
                    debug!(
                        experiment_id = %experiment_id,
                        variant_id = %variant_id,
                        key = %key,
                        "Duplicate event ignored"
                    );
                    return Ok(TrackOutcome::Duplicate);
                }
                Some(claim)
            }
            None => None,
        };

        let delta = event.counter_delta();
        if !delta.is_empty() {
            if let Err(e) = self.increment_with_retry(experiment_id, variant_id, delta) {
                if let Some(claim) = &claim {
                    if let Err(release_err) = self.store.release_idempotency_key(claim) {
                        warn!(
                            experiment_id = %experiment_id,
                            error = %release_err,
                            "Failed to release idempotency key after failed increment"
                        );
                    }
                }
                return Err(e);
            }
        }

        let recorded = Event {
            id: Uuid::new_v4(),
            experiment_id,
            variant_id,
            event_type: event.event_type,
            value: event.value,
            visitor_id: event.visitor_id,
            user_id: event.user_id,
            metadata: event.metadata,
            idempotency_key: event.idempotency_key,
            timestamp: Utc::now(),
        };

        if let Err(e) = self.store.append_event(recorded.clone()) {
            AUDIT_APPEND_FAILURES_TOTAL.inc();
            warn!(
                experiment_id = %experiment_id,
                event_id = %recorded.id,
                error = %e,
                "Event log append failed; counters already updated"
            );
        }

        Ok(TrackOutcome::Recorded(recorded))
    }

    fn increment_with_retry(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        delta: CounterDelta,
    ) -> Result<VariantCounters> {
        let attempts = self.config.track_retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.store.increment(experiment_id, variant_id, delta) {
                Ok(counters) => return Ok(counters),
                Err(StoreError::Transient(reason)) if attempt < attempts => {
                    let delay = self.config.retry_delay(attempt);
                    EVENT_RETRIES_TOTAL.inc();
                    debug!(
                        experiment_id = %experiment_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Retrying counter increment"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(StoreError::Conflict(_)) => {
                    // Status changed between the check and the increment
                    let status = self
                        .store
                        .get(experiment_id)?
                        .map(|e| e.status)
                        .ok_or_else(|| EngineError::experiment_not_found(experiment_id))?;
                    return Err(EngineError::InvalidState {
                        id: experiment_id,
                        status,
                        operation: "track events for",
                    });
                }
                Err(e) => {
                    if matches!(e, StoreError::Transient(_)) {
                        warn!(
                            experiment_id = %experiment_id,
                            attempts,
                            error = %e,
                            "Counter increment failed after retries"
                        );
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// Event log for an experiment, in append order
    pub fn events(&self, experiment_id: Uuid) -> Result<Vec<Event>> {
        if self.store.get(experiment_id)?.is_none() {
            return Err(EngineError::experiment_not_found(experiment_id));
        }
        Ok(self.store.events(experiment_id)?)
    }

    /// Recompute per-variant counters from the event log
    ///
    /// Diverges from the live counters only where an append failed after its
    /// increment succeeded.
    pub fn replay(&self, experiment_id: Uuid) -> Result<HashMap<Uuid, VariantCounters>> {
        let experiment = self
            .store
            .get(experiment_id)?
            .ok_or_else(|| EngineError::experiment_not_found(experiment_id))?;

        let mut counters: HashMap<Uuid, VariantCounters> = experiment
            .variants
            .iter()
            .map(|v| (v.id, VariantCounters::default()))
            .collect();

        for event in self.store.events(experiment_id)? {
            let entry = counters.entry(event.variant_id).or_default();
            match event.event_type {
                EventType::Impression => entry.impressions += 1,
                EventType::Conversion => entry.conversions += 1,
                _ => {}
            }
            if let Some(value) = event.value {
                entry.total_value += value;
            }
        }

        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::manager::ExperimentManager;
    use crate::experiment::storage::MemoryStore;
    use crate::experiment::types::{NewExperiment, NewVariant};

    fn setup() -> (ExperimentManager, EventTracker, Uuid, Uuid) {
        let store: Arc<dyn ExperimentStore> = Arc::new(MemoryStore::new());
        let manager = ExperimentManager::new(Arc::clone(&store));
        let tracker = EventTracker::new(store, EngineConfig::default());
        let exp = manager
            .create(
                NewExperiment::builder("scope", "tracker")
                    .variant(NewVariant::control("control", 50))
                    .variant(NewVariant::treatment("treatment", 50))
                    .build(),
            )
            .unwrap();
        let variant_id = exp.variants[1].id;
        manager.start(exp.id).unwrap();
        (manager, tracker, exp.id, variant_id)
    }

    #[test]
    fn test_record_updates_counters_and_log() {
        let (manager, tracker, id, variant_id) = setup();
        tracker
            .record(id, variant_id, TrackEvent::impression("v1"))
            .unwrap();
        tracker
            .record(id, variant_id, TrackEvent::conversion("v1").with_value(9.5))
            .unwrap();

        let exp = manager.get(id).unwrap();
        let counters = exp.variant(variant_id).unwrap().counters;
        assert_eq!(counters.impressions, 1);
        assert_eq!(counters.conversions, 1);
        assert_eq!(counters.total_value, 9.5);
        assert_eq!(tracker.events(id).unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_key_is_noop() {
        let (manager, tracker, id, variant_id) = setup();
        let event = TrackEvent::conversion("v1").with_idempotency_key("order-7");
        assert!(!tracker.record(id, variant_id, event.clone()).unwrap().is_duplicate());
        assert!(tracker.record(id, variant_id, event).unwrap().is_duplicate());

        let exp = manager.get(id).unwrap();
        assert_eq!(exp.variant(variant_id).unwrap().counters.conversions, 1);
        assert_eq!(tracker.events(id).unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_when_paused() {
        let (manager, tracker, id, variant_id) = setup();
        manager.pause(id).unwrap();
        let err = tracker
            .record(id, variant_id, TrackEvent::impression("v1"))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidState {
                status: ExperimentStatus::Paused,
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_foreign_variant() {
        let (_manager, tracker, id, _) = setup();
        let err = tracker
            .record(id, Uuid::new_v4(), TrackEvent::impression("v1"))
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_rejects_non_finite_value() {
        let (_manager, tracker, id, variant_id) = setup();
        let err = tracker
            .record(id, variant_id, TrackEvent::conversion("v1").with_value(f64::NAN))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_click_is_logged_without_counter_change() {
        let (manager, tracker, id, variant_id) = setup();
        tracker
            .record(id, variant_id, TrackEvent::new(EventType::Click, "v1"))
            .unwrap();
        let exp = manager.get(id).unwrap();
        assert_eq!(exp.variant(variant_id).unwrap().counters, VariantCounters::default());
        assert_eq!(tracker.events(id).unwrap().len(), 1);
    }

    #[test]
    fn test_replay_matches_counters() {
        let (manager, tracker, id, variant_id) = setup();
        for i in 0..20 {
            let visitor = format!("v{i}");
            tracker
                .record(id, variant_id, TrackEvent::impression(&visitor))
                .unwrap();
            if i % 4 == 0 {
                tracker
                    .record(id, variant_id, TrackEvent::conversion(&visitor).with_value(2.0))
                    .unwrap();
            }
        }
        let replayed = tracker.replay(id).unwrap();
        let live = manager.get(id).unwrap().variant(variant_id).unwrap().counters;
        assert_eq!(replayed[&variant_id], live);
    }
}
