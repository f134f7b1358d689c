//! Input validation for experiment definitions and tracked events
//!
//! Validators return `anyhow::Result` and are mapped to
//! `EngineError::Validation` at the call site with `map_validation_err(field)`.

use std::collections::HashSet;

use anyhow::{anyhow, Result};

use crate::constants::{
    MAX_HYPOTHESIS_LENGTH, MAX_NAME_LENGTH, MAX_VARIANTS, MAX_VISITOR_ID_LENGTH,
    TOTAL_SPLIT_PERCENT,
};
use crate::experiment::types::NewVariant;

/// Max serialized metadata size per event (10KB)
pub const MAX_METADATA_SIZE: usize = 10_000;

/// Validate a display name (experiment, variant, scope)
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(anyhow!("name cannot be empty"));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(anyhow!(
            "name too long: {} chars (max: {})",
            name.len(),
            MAX_NAME_LENGTH
        ));
    }

    Ok(())
}

/// Validate hypothesis text; empty is allowed
pub fn validate_hypothesis(hypothesis: &str) -> Result<()> {
    if hypothesis.len() > MAX_HYPOTHESIS_LENGTH {
        return Err(anyhow!(
            "hypothesis too long: {} chars (max: {})",
            hypothesis.len(),
            MAX_HYPOTHESIS_LENGTH
        ));
    }
    Ok(())
}

/// Validate a visitor or unit identifier
pub fn validate_visitor_id(visitor_id: &str) -> Result<()> {
    if visitor_id.is_empty() {
        return Err(anyhow!("visitor_id cannot be empty"));
    }

    if visitor_id.len() > MAX_VISITOR_ID_LENGTH {
        return Err(anyhow!(
            "visitor_id too long: {} chars (max: {})",
            visitor_id.len(),
            MAX_VISITOR_ID_LENGTH
        ));
    }

    if visitor_id.chars().any(char::is_control) {
        return Err(anyhow!("visitor_id contains control characters"));
    }

    Ok(())
}

/// Confidence level must lie strictly inside (0, 1)
pub fn validate_significance_level(level: f64) -> Result<()> {
    if !level.is_finite() || level <= 0.0 || level >= 1.0 {
        return Err(anyhow!(
            "significance_level must be strictly between 0 and 1, got: {level}"
        ));
    }
    Ok(())
}

pub fn validate_min_sample_size(min: u64) -> Result<()> {
    if min == 0 {
        return Err(anyhow!("min_sample_size must be greater than 0"));
    }
    Ok(())
}

/// Variant set invariants: count, exactly one control, unique names,
/// per-variant split in 1..=100, splits summing to exactly 100
pub fn validate_variants(variants: &[NewVariant]) -> Result<()> {
    if variants.len() < 2 {
        return Err(anyhow!(
            "at least 2 variants required, got: {}",
            variants.len()
        ));
    }

    if variants.len() > MAX_VARIANTS {
        return Err(anyhow!(
            "too many variants: {} (max: {})",
            variants.len(),
            MAX_VARIANTS
        ));
    }

    let controls = variants.iter().filter(|v| v.is_control).count();
    if controls != 1 {
        return Err(anyhow!("exactly one control variant required, got: {controls}"));
    }

    let mut names = HashSet::new();
    for variant in variants {
        validate_name(&variant.name).map_err(|e| anyhow!("variant '{}': {e}", variant.name))?;
        if !names.insert(variant.name.as_str()) {
            return Err(anyhow!("duplicate variant name: '{}'", variant.name));
        }
        if variant.split_percent == 0 || variant.split_percent > TOTAL_SPLIT_PERCENT {
            return Err(anyhow!(
                "variant '{}' split must be between 1 and {TOTAL_SPLIT_PERCENT}, got: {}",
                variant.name,
                variant.split_percent
            ));
        }
    }

    let total: u32 = variants.iter().map(|v| v.split_percent).sum();
    if total != TOTAL_SPLIT_PERCENT {
        return Err(anyhow!(
            "splits must sum to exactly {TOTAL_SPLIT_PERCENT}, got: {total}"
        ));
    }

    Ok(())
}

/// Event values must be finite
pub fn validate_event_value(value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !v.is_finite() => Err(anyhow!("value must be finite, got: {v}")),
        _ => Ok(()),
    }
}

/// Validate metadata size
pub fn validate_metadata(metadata: &serde_json::Map<String, serde_json::Value>) -> Result<()> {
    let size = serde_json::to_string(metadata)?.len();
    if size > MAX_METADATA_SIZE {
        return Err(anyhow!(
            "metadata too large: {size} bytes (max: {MAX_METADATA_SIZE})"
        ));
    }
    Ok(())
}
