//! Core experiment records: experiments, variants, events.
//!
//! All records are field-named and serde-serializable so that adapters and
//! transport layers can move them around without depending on engine internals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{DEFAULT_MIN_SAMPLE_SIZE, DEFAULT_SIGNIFICANCE_LEVEL};
use crate::stats::{ArmCounts, SprtConfig};

/// Lifecycle status of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    /// Being configured, not yet accepting traffic
    Draft,
    /// Accepting assignments and events
    Running,
    /// Temporarily not accepting events
    Paused,
    /// Concluded, winner (if any) recorded; immutable apart from audit notes
    Completed,
    /// Historical record
    Archived,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    /// Allowed lifecycle transitions. Monotonic apart from Running <-> Paused.
    pub fn can_transition_to(&self, next: ExperimentStatus) -> bool {
        use ExperimentStatus::*;
        matches!(
            (self, next),
            (Draft, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Paused, Completed)
                | (Draft, Archived)
                | (Completed, Archived)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Archived)
    }
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Winner-selection strategy configured per experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinnerStrategy {
    /// Select as soon as significance and minimum sample are reached
    #[default]
    Immediate,
    /// Significance must hold through 1.5x the minimum sample
    Conservative,
    /// Significance plus positive economic value versus control
    Economic,
    /// 99% confidence, positive lower bound, 2x the minimum sample
    SafetyFirst,
}

impl WinnerStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Conservative => "conservative",
            Self::Economic => "economic",
            Self::SafetyFirst => "safety_first",
        }
    }
}

/// Running counters for a variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantCounters {
    pub impressions: u64,
    pub conversions: u64,
    /// Accumulated economic value across all value-carrying events
    pub total_value: f64,
}

impl VariantCounters {
    pub fn conversion_rate(&self) -> f64 {
        if self.impressions == 0 {
            0.0
        } else {
            self.conversions as f64 / self.impressions as f64
        }
    }

    /// Economic value normalized by exposure
    pub fn value_per_impression(&self) -> f64 {
        if self.impressions == 0 {
            0.0
        } else {
            self.total_value / self.impressions as f64
        }
    }

    pub fn arm(&self) -> ArmCounts {
        ArmCounts::new(self.impressions, self.conversions)
    }
}

/// One treatment (or the control) within an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub name: String,
    /// Opaque content owned by the content adapter
    pub content: serde_json::Value,
    pub is_control: bool,
    /// Integer percentage of traffic
    pub split_percent: u32,
    pub counters: VariantCounters,
    pub created_at: DateTime<Utc>,
}

/// Free-text note attached to an experiment; the only thing that may change
/// once an experiment is completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditNote {
    pub at: DateTime<Utc>,
    pub note: String,
}

/// A controlled experiment with its variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Uuid,
    /// Owning tenant or workspace
    pub scope_id: String,
    pub name: String,
    pub hypothesis: String,
    /// Opaque content-type tag, resolved through the adapter registry
    pub content_type: String,
    pub status: ExperimentStatus,
    /// Confidence level, e.g. 0.95
    pub significance_level: f64,
    /// Minimum impressions per variant before a winner may be selected
    pub min_sample_size: u64,
    pub strategy: WinnerStrategy,
    pub auto_apply_winner: bool,
    /// Attach Bayesian annotations to analyses
    pub bayesian_enabled: bool,
    /// Attach SPRT annotations to analyses
    pub sequential: Option<SprtConfig>,
    /// Variants in creation order
    pub variants: Vec<Variant>,
    pub winning_variant_id: Option<Uuid>,
    pub audit_notes: Vec<AuditNote>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Experiment {
    pub fn control(&self) -> Option<&Variant> {
        self.variants.iter().find(|v| v.is_control)
    }

    pub fn variant(&self, variant_id: Uuid) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    pub fn treatments(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter().filter(|v| !v.is_control)
    }

    pub fn total_impressions(&self) -> u64 {
        self.variants.iter().map(|v| v.counters.impressions).sum()
    }

    /// Smallest per-variant impression count
    pub fn min_variant_impressions(&self) -> u64 {
        self.variants
            .iter()
            .map(|v| v.counters.impressions)
            .min()
            .unwrap_or(0)
    }

    pub fn has_min_sample(&self, multiplier: f64) -> bool {
        self.min_variant_impressions() as f64 >= self.min_sample_size as f64 * multiplier
    }
}

/// Variant definition supplied at creation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVariant {
    pub name: String,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub is_control: bool,
    pub split_percent: u32,
}

impl NewVariant {
    pub fn control(name: &str, split_percent: u32) -> Self {
        Self {
            name: name.to_string(),
            content: serde_json::Value::Null,
            is_control: true,
            split_percent,
        }
    }

    pub fn treatment(name: &str, split_percent: u32) -> Self {
        Self {
            name: name.to_string(),
            content: serde_json::Value::Null,
            is_control: false,
            split_percent,
        }
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }
}

fn default_significance() -> f64 {
    DEFAULT_SIGNIFICANCE_LEVEL
}

fn default_min_sample() -> u64 {
    DEFAULT_MIN_SAMPLE_SIZE
}

fn default_content_type() -> String {
    "json".to_string()
}

/// Experiment definition supplied to `create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExperiment {
    pub scope_id: String,
    pub name: String,
    #[serde(default)]
    pub hypothesis: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default = "default_significance")]
    pub significance_level: f64,
    #[serde(default = "default_min_sample")]
    pub min_sample_size: u64,
    #[serde(default)]
    pub strategy: WinnerStrategy,
    #[serde(default)]
    pub auto_apply_winner: bool,
    #[serde(default)]
    pub bayesian_enabled: bool,
    #[serde(default)]
    pub sequential: Option<SprtConfig>,
    pub variants: Vec<NewVariant>,
}

impl NewExperiment {
    pub fn builder(scope_id: &str, name: &str) -> NewExperimentBuilder {
        NewExperimentBuilder::new(scope_id, name)
    }
}

/// Builder for experiment definitions
pub struct NewExperimentBuilder {
    spec: NewExperiment,
}

impl NewExperimentBuilder {
    pub fn new(scope_id: &str, name: &str) -> Self {
        Self {
            spec: NewExperiment {
                scope_id: scope_id.to_string(),
                name: name.to_string(),
                hypothesis: String::new(),
                content_type: default_content_type(),
                significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
                min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
                strategy: WinnerStrategy::default(),
                auto_apply_winner: false,
                bayesian_enabled: false,
                sequential: None,
                variants: Vec::new(),
            },
        }
    }

    pub fn hypothesis(mut self, hypothesis: &str) -> Self {
        self.spec.hypothesis = hypothesis.to_string();
        self
    }

    pub fn content_type(mut self, content_type: &str) -> Self {
        self.spec.content_type = content_type.to_string();
        self
    }

    pub fn significance_level(mut self, level: f64) -> Self {
        self.spec.significance_level = level;
        self
    }

    pub fn min_sample_size(mut self, min: u64) -> Self {
        self.spec.min_sample_size = min;
        self
    }

    pub fn strategy(mut self, strategy: WinnerStrategy) -> Self {
        self.spec.strategy = strategy;
        self
    }

    pub fn auto_apply_winner(mut self, enabled: bool) -> Self {
        self.spec.auto_apply_winner = enabled;
        self
    }

    pub fn bayesian(mut self, enabled: bool) -> Self {
        self.spec.bayesian_enabled = enabled;
        self
    }

    pub fn sequential(mut self, config: SprtConfig) -> Self {
        self.spec.sequential = Some(config);
        self
    }

    pub fn variant(mut self, variant: NewVariant) -> Self {
        self.spec.variants.push(variant);
        self
    }

    pub fn build(self) -> NewExperiment {
        self.spec
    }
}

/// Kind of tracked event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Impression,
    Click,
    Conversion,
    Custom(String),
}

impl EventType {
    pub fn label(&self) -> &str {
        match self {
            Self::Impression => "impression",
            Self::Click => "click",
            Self::Conversion => "conversion",
            Self::Custom(name) => name.as_str(),
        }
    }

    /// Metric label with bounded cardinality
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Impression => "impression",
            Self::Click => "click",
            Self::Conversion => "conversion",
            Self::Custom(_) => "custom",
        }
    }
}

/// Event as submitted by a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackEvent {
    pub event_type: EventType,
    #[serde(default)]
    pub value: Option<f64>,
    /// Anonymous visitor / unit identifier
    pub visitor_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Deduplication key; a repeat of (variant, visitor, type, key) is a no-op
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl TrackEvent {
    pub fn new(event_type: EventType, visitor_id: &str) -> Self {
        Self {
            event_type,
            value: None,
            visitor_id: visitor_id.to_string(),
            user_id: None,
            metadata: serde_json::Map::new(),
            idempotency_key: None,
        }
    }

    pub fn impression(visitor_id: &str) -> Self {
        Self::new(EventType::Impression, visitor_id)
    }

    pub fn conversion(visitor_id: &str) -> Self {
        Self::new(EventType::Conversion, visitor_id)
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn with_idempotency_key(mut self, key: &str) -> Self {
        self.idempotency_key = Some(key.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Counter deltas this event applies
    pub fn counter_delta(&self) -> CounterDelta {
        CounterDelta {
            impressions: u64::from(self.event_type == EventType::Impression),
            conversions: u64::from(self.event_type == EventType::Conversion),
            value: self.value.unwrap_or(0.0),
        }
    }
}

/// Atomic increment applied to a variant's counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CounterDelta {
    pub impressions: u64,
    pub conversions: u64,
    pub value: f64,
}

impl CounterDelta {
    pub fn is_empty(&self) -> bool {
        self.impressions == 0 && self.conversions == 0 && self.value == 0.0
    }
}

/// Immutable recorded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub variant_id: Uuid,
    pub event_type: EventType,
    pub value: Option<f64>,
    pub visitor_id: String,
    pub user_id: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub idempotency_key: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Counts per lifecycle status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub total: usize,
    pub draft: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub archived: usize,
}
