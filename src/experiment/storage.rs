//! Storage boundary for experiments, counters and the event log
//!
//! The engine only talks to [`ExperimentStore`]. Counter increments and status
//! transitions are conditional updates inside the store, never a
//! read-modify-write in engine code, so correctness holds with many concurrent
//! writers and across engine instances sharing a backend.
//!
//! [`MemoryStore`] is the in-process implementation: `DashMap` shards per
//! experiment, atomic counters per variant, and a compare-and-swap loop for the
//! floating point value total.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use uuid::Uuid;

use super::types::{
    AuditNote, CounterDelta, Event, EventType, Experiment, ExperimentStatus, VariantCounters,
};
use crate::errors::StoreError;

/// Deduplication tuple for idempotent event tracking
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub variant_id: Uuid,
    pub visitor_id: String,
    pub event_type: EventType,
    pub key: String,
}

/// Requested status change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusChange {
    pub to: ExperimentStatus,
    pub at: DateTime<Utc>,
    /// Recorded only when moving to `Completed`
    pub winning_variant_id: Option<Uuid>,
}

/// Result of a conditional status transition
#[derive(Debug, Clone)]
pub enum Transition {
    /// The experiment was in an expected state and now carries the change
    Applied(Experiment),
    /// The experiment was not in any expected state; snapshot of its current state
    Rejected(Experiment),
}

/// Persistence boundary consumed by the engine
pub trait ExperimentStore: Send + Sync {
    /// Persist an experiment and its variants as one unit
    fn insert(&self, experiment: Experiment) -> Result<(), StoreError>;

    /// Snapshot with current counters
    fn get(&self, id: Uuid) -> Result<Option<Experiment>, StoreError>;

    fn list(&self) -> Result<Vec<Experiment>, StoreError>;

    /// Apply `change` only if the current status is one of `expected`
    fn transition(
        &self,
        id: Uuid,
        expected: &[ExperimentStatus],
        change: StatusChange,
    ) -> Result<Transition, StoreError>;

    /// Atomically add `delta` to a variant's counters, conditional on the
    /// experiment being `Running`. Returns the counters after the update.
    fn increment(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        delta: CounterDelta,
    ) -> Result<VariantCounters, StoreError>;

    /// Append to the event log
    fn append_event(&self, event: Event) -> Result<(), StoreError>;

    fn events(&self, experiment_id: Uuid) -> Result<Vec<Event>, StoreError>;

    /// Claim a deduplication key; `false` when it was already claimed
    fn claim_idempotency_key(&self, key: &IdempotencyKey) -> Result<bool, StoreError>;

    fn release_idempotency_key(&self, key: &IdempotencyKey) -> Result<(), StoreError>;

    /// Attach an audit note; permitted in every status
    fn add_audit_note(&self, id: Uuid, note: AuditNote) -> Result<(), StoreError>;
}

/// Lock-free counters for one variant
#[derive(Debug, Default)]
struct CounterCells {
    impressions: AtomicU64,
    conversions: AtomicU64,
    /// `f64` bit pattern, updated with compare-and-swap
    total_value_bits: AtomicU64,
}

impl CounterCells {
    fn from_counters(counters: &VariantCounters) -> Self {
        Self {
            impressions: AtomicU64::new(counters.impressions),
            conversions: AtomicU64::new(counters.conversions),
            total_value_bits: AtomicU64::new(counters.total_value.to_bits()),
        }
    }

    fn apply(&self, delta: CounterDelta) -> VariantCounters {
        let impressions = self.impressions.fetch_add(delta.impressions, Ordering::AcqRel)
            + delta.impressions;
        let conversions = self.conversions.fetch_add(delta.conversions, Ordering::AcqRel)
            + delta.conversions;
        let total_value = if delta.value != 0.0 {
            add_f64(&self.total_value_bits, delta.value)
        } else {
            f64::from_bits(self.total_value_bits.load(Ordering::Acquire))
        };
        VariantCounters {
            impressions,
            conversions,
            total_value,
        }
    }

    fn snapshot(&self) -> VariantCounters {
        VariantCounters {
            impressions: self.impressions.load(Ordering::Acquire),
            conversions: self.conversions.load(Ordering::Acquire),
            total_value: f64::from_bits(self.total_value_bits.load(Ordering::Acquire)),
        }
    }
}

/// Atomic `f64` addition over an `AtomicU64` holding the bit pattern
fn add_f64(cell: &AtomicU64, value: f64) -> f64 {
    let mut current = cell.load(Ordering::Acquire);
    loop {
        let next = f64::from_bits(current) + value;
        match cell.compare_exchange_weak(
            current,
            next.to_bits(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return next,
            Err(actual) => current = actual,
        }
    }
}

struct StoredExperiment {
    /// Everything except live counters; the write lock serializes transitions
    record: RwLock<Experiment>,
    counters: HashMap<Uuid, CounterCells>,
}

impl StoredExperiment {
    fn snapshot(&self) -> Experiment {
        let mut experiment = self.record.read().clone();
        self.fill_counters(&mut experiment);
        experiment
    }

    fn fill_counters(&self, experiment: &mut Experiment) {
        for variant in &mut experiment.variants {
            if let Some(cells) = self.counters.get(&variant.id) {
                variant.counters = cells.snapshot();
            }
        }
    }
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    experiments: DashMap<Uuid, Arc<StoredExperiment>>,
    events: DashMap<Uuid, Arc<RwLock<Vec<Event>>>>,
    idempotency_keys: DashSet<IdempotencyKey>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn stored(&self, id: Uuid) -> Result<Arc<StoredExperiment>, StoreError> {
        self.experiments
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StoreError::NotFound(format!("experiment {id}")))
    }
}

impl ExperimentStore for MemoryStore {
    fn insert(&self, experiment: Experiment) -> Result<(), StoreError> {
        let counters = experiment
            .variants
            .iter()
            .map(|v| (v.id, CounterCells::from_counters(&v.counters)))
            .collect();
        let id = experiment.id;

        match self.experiments.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "experiment {id} already exists"
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(StoredExperiment {
                    record: RwLock::new(experiment),
                    counters,
                }));
                self.events
                    .insert(id, Arc::new(RwLock::new(Vec::new())));
                Ok(())
            }
        }
    }

    fn get(&self, id: Uuid) -> Result<Option<Experiment>, StoreError> {
        Ok(self
            .experiments
            .get(&id)
            .map(|entry| entry.value().snapshot()))
    }

    fn list(&self) -> Result<Vec<Experiment>, StoreError> {
        let mut all: Vec<Experiment> = self
            .experiments
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        all.sort_by_key(|e| e.created_at);
        Ok(all)
    }

    fn transition(
        &self,
        id: Uuid,
        expected: &[ExperimentStatus],
        change: StatusChange,
    ) -> Result<Transition, StoreError> {
        let stored = self.stored(id)?;
        let mut record = stored.record.write();

        if !expected.contains(&record.status) {
            let mut current = record.clone();
            stored.fill_counters(&mut current);
            return Ok(Transition::Rejected(current));
        }

        record.status = change.to;
        match change.to {
            ExperimentStatus::Running if record.started_at.is_none() => {
                record.started_at = Some(change.at);
            }
            ExperimentStatus::Completed => {
                record.completed_at = Some(change.at);
                record.winning_variant_id = change.winning_variant_id;
            }
            _ => {}
        }

        let mut updated = record.clone();
        stored.fill_counters(&mut updated);
        Ok(Transition::Applied(updated))
    }

    fn increment(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        delta: CounterDelta,
    ) -> Result<VariantCounters, StoreError> {
        let stored = self.stored(experiment_id)?;
        // Shared lock: increments run in parallel but never interleave with a
        // status transition.
        let record = stored.record.read();
        if record.status != ExperimentStatus::Running {
            return Err(StoreError::Conflict(format!(
                "experiment {experiment_id} is {}",
                record.status
            )));
        }
        let cells = stored
            .counters
            .get(&variant_id)
            .ok_or_else(|| StoreError::NotFound(format!("variant {variant_id}")))?;
        Ok(cells.apply(delta))
    }

    fn append_event(&self, event: Event) -> Result<(), StoreError> {
        let log = self
            .events
            .get(&event.experiment_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StoreError::NotFound(format!("experiment {}", event.experiment_id)))?;
        log.write().push(event);
        Ok(())
    }

    fn events(&self, experiment_id: Uuid) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .events
            .get(&experiment_id)
            .map(|entry| entry.value().read().clone())
            .unwrap_or_default())
    }

    fn claim_idempotency_key(&self, key: &IdempotencyKey) -> Result<bool, StoreError> {
        Ok(self.idempotency_keys.insert(key.clone()))
    }

    fn release_idempotency_key(&self, key: &IdempotencyKey) -> Result<(), StoreError> {
        self.idempotency_keys.remove(key);
        Ok(())
    }

    fn add_audit_note(&self, id: Uuid, note: AuditNote) -> Result<(), StoreError> {
        let stored = self.stored(id)?;
        stored.record.write().audit_notes.push(note);
        Ok(())
    }
}
