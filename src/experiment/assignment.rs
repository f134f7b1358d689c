//! Deterministic variant assignment
//!
//! A unit is hashed together with the experiment id, so the same unit lands in
//! the same variant on every call and on every node, while assignments across
//! experiments stay independent. SHA-256 is used instead of `DefaultHasher`
//! because the std hasher is not stable across releases or platforms.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::types::{Experiment, ExperimentStatus, Variant};
use crate::constants::BUCKET_RESOLUTION;
use crate::errors::{EngineError, Result};

/// Bucket for a unit in percent, `[0, 100)` at 0.01 resolution
pub fn bucket(experiment_id: Uuid, unit_id: &str) -> f64 {
    bucket_basis_points(experiment_id, unit_id) as f64 / 100.0
}

fn bucket_basis_points(experiment_id: Uuid, unit_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(experiment_id.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(unit_id.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % BUCKET_RESOLUTION
}

/// Assign a unit to a variant of a running experiment
pub fn assign<'a>(experiment: &'a Experiment, unit_id: &str) -> Result<&'a Variant> {
    if experiment.status != ExperimentStatus::Running {
        return Err(EngineError::NotRunning(experiment.id));
    }

    let point = bucket_basis_points(experiment.id, unit_id);
    let mut upper = 0u64;
    for variant in &experiment.variants {
        // Splits are whole percents; 1% is 100 basis points
        upper += u64::from(variant.split_percent) * 100;
        if point < upper {
            return Ok(variant);
        }
    }

    // Only reachable if splits were corrupted after validation
    experiment
        .variants
        .last()
        .ok_or_else(|| EngineError::validation("variants", "experiment has no variants"))
}
