//! Configuration management for the experimentation engine
//!
//! All configurable parameters in one place with environment variable overrides.
//! Follows the principle: sensible defaults, configurable in production.

use std::env;
use std::time::Duration;
use tracing::info;

use crate::constants::{
    DEFAULT_MIN_SAMPLE_SIZE, DEFAULT_MONTE_CARLO_DRAWS, DEFAULT_MONTE_CARLO_SEED,
    DEFAULT_SIGNIFICANCE_LEVEL, DEFAULT_TRACK_RETRY_ATTEMPTS, DEFAULT_TRACK_RETRY_BASE_DELAY_MS,
    MAX_MONTE_CARLO_DRAWS, MIN_MONTE_CARLO_DRAWS,
};
use crate::experiment::types::NewExperimentBuilder;
use crate::stats::SprtConfig;

/// Engine configuration loaded from environment with defaults
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Monte Carlo draws per Bayesian analysis (default: 10,000)
    /// Clamped to [1,000, 1,000,000]
    pub monte_carlo_draws: usize,

    /// Seed for Bayesian sampling; fixed so repeated analyses agree
    pub monte_carlo_seed: u64,

    /// Attempts for a counter increment that hits transient storage errors (default: 3)
    pub track_retry_attempts: u32,

    /// Backoff before the first retry; doubles per attempt (default: 5ms)
    pub track_retry_base_delay_ms: u64,

    /// Confidence level for experiments built through the engine (default: 0.95)
    pub default_significance_level: f64,

    /// Minimum impressions per variant for experiments built through the engine (default: 100)
    pub default_min_sample_size: u64,

    /// SPRT parameters for experiments built through the engine
    pub sprt: SprtConfig,

    /// Attach `sprt` to experiments built through the engine (default: false)
    pub enable_sequential: bool,

    /// Attach Bayesian annotations to experiments built through the engine (default: false)
    pub enable_bayesian: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            monte_carlo_draws: DEFAULT_MONTE_CARLO_DRAWS,
            monte_carlo_seed: DEFAULT_MONTE_CARLO_SEED,
            track_retry_attempts: DEFAULT_TRACK_RETRY_ATTEMPTS,
            track_retry_base_delay_ms: DEFAULT_TRACK_RETRY_BASE_DELAY_MS,
            default_significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
            default_min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
            sprt: SprtConfig::default(),
            enable_sequential: false,
            enable_bayesian: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults
    #[allow(clippy::field_reassign_with_default)] // Environment overrides require mutable config
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Bayesian sampling
        if let Ok(val) = env::var("XP_MONTE_CARLO_DRAWS") {
            if let Ok(n) = val.parse::<usize>() {
                config.monte_carlo_draws = n.clamp(MIN_MONTE_CARLO_DRAWS, MAX_MONTE_CARLO_DRAWS);
            }
        }

        if let Ok(val) = env::var("XP_MONTE_CARLO_SEED") {
            if let Ok(n) = val.parse() {
                config.monte_carlo_seed = n;
            }
        }

        if let Ok(val) = env::var("XP_ENABLE_BAYESIAN") {
            config.enable_bayesian = val.to_lowercase() == "true" || val == "1";
        }

        // Event tracking retries
        if let Ok(val) = env::var("XP_TRACK_RETRY_ATTEMPTS") {
            if let Ok(n) = val.parse::<u32>() {
                config.track_retry_attempts = n.clamp(1, 10);
            }
        }

        if let Ok(val) = env::var("XP_TRACK_RETRY_BASE_DELAY_MS") {
            if let Ok(n) = val.parse::<u64>() {
                config.track_retry_base_delay_ms = n.min(1_000);
            }
        }

        // Experiment defaults
        if let Ok(val) = env::var("XP_DEFAULT_SIGNIFICANCE") {
            if let Ok(n) = val.parse::<f64>() {
                if n > 0.0 && n < 1.0 {
                    config.default_significance_level = n;
                }
            }
        }

        if let Ok(val) = env::var("XP_DEFAULT_MIN_SAMPLE") {
            if let Ok(n) = val.parse::<u64>() {
                config.default_min_sample_size = n.max(1);
            }
        }

        // Sequential testing
        if let Ok(val) = env::var("XP_ENABLE_SEQUENTIAL") {
            config.enable_sequential = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = env::var("XP_SPRT_ALPHA") {
            if let Ok(n) = val.parse::<f64>() {
                config.sprt.alpha = n.clamp(0.001, 0.5);
            }
        }

        if let Ok(val) = env::var("XP_SPRT_BETA") {
            if let Ok(n) = val.parse::<f64>() {
                config.sprt.beta = n.clamp(0.001, 0.5);
            }
        }

        if let Ok(val) = env::var("XP_SPRT_MDE") {
            if let Ok(n) = val.parse::<f64>() {
                if n > 0.0 {
                    config.sprt.minimum_detectable_effect = n;
                }
            }
        }

        config
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.track_retry_base_delay_ms.saturating_mul(factor))
    }

    /// Experiment builder pre-filled with this configuration's defaults
    pub fn experiment_builder(&self, scope_id: &str, name: &str) -> NewExperimentBuilder {
        let builder = NewExperimentBuilder::new(scope_id, name)
            .significance_level(self.default_significance_level)
            .min_sample_size(self.default_min_sample_size)
            .bayesian(self.enable_bayesian);
        if self.enable_sequential {
            builder.sequential(self.sprt)
        } else {
            builder
        }
    }

    /// Log the current configuration
    pub fn log(&self) {
        info!("📋 Engine configuration:");
        info!(
            "   Defaults: significance {:.3}, min sample {} per variant",
            self.default_significance_level, self.default_min_sample_size
        );
        if self.enable_bayesian {
            info!(
                "   Bayesian: enabled ({} draws, seed {:#x})",
                self.monte_carlo_draws, self.monte_carlo_seed
            );
        } else {
            info!("   Bayesian: opt-in per experiment ({} draws)", self.monte_carlo_draws);
        }
        info!(
            "   SPRT: {} (mde {:.2}, alpha {:.3}, beta {:.3})",
            if self.enable_sequential { "enabled" } else { "opt-in per experiment" },
            self.sprt.minimum_detectable_effect,
            self.sprt.alpha,
            self.sprt.beta
        );
        info!(
            "   Tracking retries: {} attempts (base delay {}ms)",
            self.track_retry_attempts, self.track_retry_base_delay_ms
        );
    }
}

/// Environment variable documentation
pub fn print_env_help() {
    println!("Experimentation Engine Configuration Environment Variables:");
    println!();
    println!("Experiment defaults:");
    println!("  XP_DEFAULT_SIGNIFICANCE      - Confidence level in (0,1) (default: 0.95)");
    println!("  XP_DEFAULT_MIN_SAMPLE        - Minimum impressions per variant (default: 100)");
    println!();
    println!("Bayesian analysis:");
    println!("  XP_ENABLE_BAYESIAN           - Attach Bayesian annotations true/false (default: false)");
    println!("  XP_MONTE_CARLO_DRAWS         - Draws per analysis, 1000..1000000 (default: 10000)");
    println!("  XP_MONTE_CARLO_SEED          - Sampling seed (default: fixed)");
    println!();
    println!("Sequential testing (SPRT):");
    println!("  XP_ENABLE_SEQUENTIAL         - Attach SPRT annotations true/false (default: false)");
    println!("  XP_SPRT_ALPHA                - False-positive rate (default: 0.05)");
    println!("  XP_SPRT_BETA                 - False-negative rate (default: 0.20)");
    println!("  XP_SPRT_MDE                  - Relative lift to detect (default: 0.20)");
    println!();
    println!("Event tracking:");
    println!("  XP_TRACK_RETRY_ATTEMPTS      - Attempts on transient storage errors (default: 3)");
    println!("  XP_TRACK_RETRY_BASE_DELAY_MS - First backoff delay in ms (default: 5)");
    println!();
    println!("  RUST_LOG                     - Log level (e.g., info, debug, trace)");
    println!("  XP_LOG_FORMAT                - 'compact' for single-line log output");
    println!();
}
