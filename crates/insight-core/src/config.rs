//! Analysis configuration
//!
//! One structured config object supplied at run start. All thresholds and
//! weights live here with documented defaults; nothing in the engine keeps
//! global mutable tuning state. Validation is fail-fast: an invalid config
//! never starts a run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a config file
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML
    #[error("failed to parse YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// A weight set does not sum to 1
    #[error("weights '{name}' must sum to 1.0 (got {sum})")]
    WeightsNotNormalized { name: String, sum: f64 },
}

/// A noise-filter exclusion rule
///
/// Exclusions are data, not control flow: the default set below can be
/// replaced or extended wholesale through configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionRule {
    /// Entity id starts with the given string
    Prefix(String),
    /// Entity id contains the given string
    Substring(String),
    /// Entire domain is excluded
    Domain(String),
    /// Entity id matches the regex (compiled by the noise filter)
    Regex(String),
}

/// Default exclusion set: diagnostic, system and tracker entities that
/// never make actionable automation participants.
pub fn default_exclusions() -> Vec<ExclusionRule> {
    vec![
        ExclusionRule::Domain("update".to_string()),
        ExclusionRule::Domain("device_tracker".to_string()),
        ExclusionRule::Domain("persistent_notification".to_string()),
        ExclusionRule::Domain("tts".to_string()),
        ExclusionRule::Domain("zone".to_string()),
        ExclusionRule::Substring("_battery".to_string()),
        ExclusionRule::Substring("_signal_strength".to_string()),
        ExclusionRule::Substring("_uptime".to_string()),
        ExclusionRule::Substring("_linkquality".to_string()),
        ExclusionRule::Substring("_firmware".to_string()),
        ExclusionRule::Prefix("sensor.sun_".to_string()),
        ExclusionRule::Prefix("binary_sensor.remote_ui".to_string()),
    ]
}

/// Detectors that can be enabled for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    CoOccurrence,
    TimeOfDay,
    Sequence,
    RoomBased,
    DayType,
    Contextual,
}

fn default_enabled_detectors() -> Vec<DetectorKind> {
    vec![
        DetectorKind::CoOccurrence,
        DetectorKind::TimeOfDay,
        DetectorKind::Sequence,
        DetectorKind::RoomBased,
        DetectorKind::DayType,
        DetectorKind::Contextual,
    ]
}

/// Weight blend for device-pair scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairWeights {
    pub compatibility: f64,
    pub usage: f64,
    pub area: f64,
    pub reliability: f64,
}

impl Default for PairWeights {
    fn default() -> Self {
        Self {
            compatibility: 0.40,
            usage: 0.30,
            area: 0.20,
            reliability: 0.10,
        }
    }
}

impl PairWeights {
    pub fn sum(&self) -> f64 {
        self.compatibility + self.usage + self.area + self.reliability
    }
}

/// Weight blend for context-aware score augmentation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextBlendWeights {
    pub base: f64,
    pub temporal: f64,
    pub weather: f64,
    pub energy: f64,
    pub behavior: f64,
}

impl Default for ContextBlendWeights {
    fn default() -> Self {
        Self {
            base: 0.40,
            temporal: 0.20,
            weather: 0.15,
            energy: 0.15,
            behavior: 0.10,
        }
    }
}

impl ContextBlendWeights {
    pub fn sum(&self) -> f64 {
        self.base + self.temporal + self.weather + self.energy + self.behavior
    }
}

/// The structured analysis configuration, consumed at run start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Sliding co-occurrence window in minutes
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,

    /// Minimum occurrence count for any pattern
    #[serde(default = "default_min_support")]
    pub min_support: u32,

    /// Minimum co-occurrence confidence for pair candidacy
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Patterns with timing std above this are rejected
    #[serde(default = "default_max_variance_minutes")]
    pub max_variance_minutes: f64,

    /// Ranked-pair cap before chain expansion
    #[serde(default = "default_top_pairs_for_chains")]
    pub top_pairs_for_chains: usize,

    /// Maximum devices in a chain
    #[serde(default = "default_max_chain_length")]
    pub max_chain_length: usize,

    /// Base confidence a chain link must clear
    #[serde(default = "default_chain_min_confidence")]
    pub chain_min_confidence: f64,

    /// Per-link threshold multiplier; > 1 means longer chains need
    /// progressively stronger evidence
    #[serde(default = "default_chain_decay")]
    pub chain_decay: f64,

    /// Peak-hour share needed for a time-of-day pattern
    #[serde(default = "default_time_of_day_concentration")]
    pub time_of_day_concentration: f64,

    /// Minimum repeats for an ordered sequence
    #[serde(default = "default_min_sequence_repeats")]
    pub min_sequence_repeats: u32,

    /// Deviation from the 5/7 weekday baseline needed for a day-type
    /// pattern
    #[serde(default = "default_day_type_bias")]
    pub day_type_bias: f64,

    /// Usage lift needed for a contextual pattern
    #[serde(default = "default_context_lift")]
    pub context_lift: f64,

    /// Soft wall-clock budget per detector, seconds
    #[serde(default = "default_detector_timeout_secs")]
    pub detector_timeout_secs: u64,

    /// Emit pairs even when an automation already covers them
    #[serde(default)]
    pub force_rediscovery: bool,

    /// Explicit detector list; dispatch is a fixed set, not reflection
    #[serde(default = "default_enabled_detectors")]
    pub enabled_detectors: Vec<DetectorKind>,

    #[serde(default)]
    pub pair_weights: PairWeights,

    #[serde(default)]
    pub context_blend: ContextBlendWeights,

    #[serde(default = "default_exclusions")]
    pub noise_exclusions: Vec<ExclusionRule>,

    /// Evidence count at which feedback carries half the blended score
    #[serde(default = "default_feedback_prior_strength")]
    pub feedback_prior_strength: f64,
}

fn default_window_minutes() -> u32 {
    5
}
fn default_min_support() -> u32 {
    5
}
fn default_min_confidence() -> f64 {
    0.4
}
fn default_max_variance_minutes() -> f64 {
    30.0
}
fn default_top_pairs_for_chains() -> usize {
    2000
}
fn default_max_chain_length() -> usize {
    5
}
fn default_chain_min_confidence() -> f64 {
    0.5
}
fn default_chain_decay() -> f64 {
    1.2
}
fn default_time_of_day_concentration() -> f64 {
    0.6
}
fn default_min_sequence_repeats() -> u32 {
    3
}
fn default_day_type_bias() -> f64 {
    0.25
}
fn default_context_lift() -> f64 {
    1.5
}
fn default_detector_timeout_secs() -> u64 {
    30
}
fn default_feedback_prior_strength() -> f64 {
    5.0
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            min_support: default_min_support(),
            min_confidence: default_min_confidence(),
            max_variance_minutes: default_max_variance_minutes(),
            top_pairs_for_chains: default_top_pairs_for_chains(),
            max_chain_length: default_max_chain_length(),
            chain_min_confidence: default_chain_min_confidence(),
            chain_decay: default_chain_decay(),
            time_of_day_concentration: default_time_of_day_concentration(),
            min_sequence_repeats: default_min_sequence_repeats(),
            day_type_bias: default_day_type_bias(),
            context_lift: default_context_lift(),
            detector_timeout_secs: default_detector_timeout_secs(),
            force_rediscovery: false,
            enabled_detectors: default_enabled_detectors(),
            pair_weights: PairWeights::default(),
            context_blend: ContextBlendWeights::default(),
            noise_exclusions: default_exclusions(),
            feedback_prior_strength: default_feedback_prior_strength(),
        }
    }
}

impl AnalysisConfig {
    /// Load from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::ParseYaml {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Fail-fast validation of thresholds and weight blends
    pub fn validate(&self) -> ConfigResult<()> {
        fn invalid(key: &str, reason: &str) -> ConfigError {
            ConfigError::InvalidValue {
                key: key.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.window_minutes == 0 {
            return Err(invalid("window_minutes", "must be at least 1"));
        }
        if self.min_support == 0 {
            return Err(invalid("min_support", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(invalid("min_confidence", "must be within [0, 1]"));
        }
        if self.max_variance_minutes <= 0.0 {
            return Err(invalid("max_variance_minutes", "must be positive"));
        }
        if self.top_pairs_for_chains == 0 {
            return Err(invalid("top_pairs_for_chains", "must be at least 1"));
        }
        if self.max_chain_length < 3 {
            return Err(invalid("max_chain_length", "chains need at least 3 devices"));
        }
        if !(0.0..=1.0).contains(&self.chain_min_confidence) {
            return Err(invalid("chain_min_confidence", "must be within [0, 1]"));
        }
        if self.chain_decay < 1.0 {
            return Err(invalid(
                "chain_decay",
                "must be >= 1.0 so longer chains require stronger evidence",
            ));
        }
        if !(0.0..=1.0).contains(&self.time_of_day_concentration) {
            return Err(invalid("time_of_day_concentration", "must be within [0, 1]"));
        }
        if self.min_sequence_repeats < 2 {
            return Err(invalid("min_sequence_repeats", "must be at least 2"));
        }
        if !(0.0..1.0).contains(&self.day_type_bias) {
            return Err(invalid("day_type_bias", "must be within [0, 1)"));
        }
        if self.context_lift <= 1.0 {
            return Err(invalid("context_lift", "must be greater than 1"));
        }
        if self.detector_timeout_secs == 0 {
            return Err(invalid("detector_timeout_secs", "must be at least 1"));
        }
        if self.enabled_detectors.is_empty() {
            return Err(invalid("enabled_detectors", "at least one detector required"));
        }
        if self.feedback_prior_strength <= 0.0 {
            return Err(invalid("feedback_prior_strength", "must be positive"));
        }

        check_normalized("pair_weights", self.pair_weights.sum())?;
        check_normalized("context_blend", self.context_blend.sum())?;

        for weight in [
            self.pair_weights.compatibility,
            self.pair_weights.usage,
            self.pair_weights.area,
            self.pair_weights.reliability,
            self.context_blend.base,
            self.context_blend.temporal,
            self.context_blend.weather,
            self.context_blend.energy,
            self.context_blend.behavior,
        ] {
            if weight < 0.0 {
                return Err(invalid("weights", "no weight may be negative"));
            }
        }

        Ok(())
    }
}

fn check_normalized(name: &str, sum: f64) -> ConfigResult<()> {
    if (sum - 1.0).abs() > 1e-6 {
        return Err(ConfigError::WeightsNotNormalized {
            name: name.to_string(),
            sum,
        });
    }
    Ok(())
}
