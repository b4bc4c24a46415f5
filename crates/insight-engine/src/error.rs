//! Engine error taxonomy

use thiserror::Error;

use insight_core::ConfigError;
use insight_detectors::NoiseFilterError;

use crate::providers::ProviderError;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Fatal run errors
///
/// Everything here aborts the pass before any output is handed to the
/// persistence sink, so the previously stored pattern/synergy sets stay
/// untouched. Recoverable conditions (detector failures, invariant
/// violations, unavailable context) never surface as this type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid thresholds or weights; rejected before the run starts
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Invalid noise exclusion rules; also a pre-run configuration fault
    #[error("noise filter configuration error: {0}")]
    NoiseRules(#[from] NoiseFilterError),

    /// A required input collaborator failed or returned nothing
    #[error("input unavailable from {collaborator}: {reason}")]
    InputUnavailable {
        collaborator: &'static str,
        reason: String,
    },

    /// A pass is already running over the snapshot
    #[error("an analysis pass is already in flight")]
    RunInFlight,

    /// The persistence sink rejected the results
    #[error("persistence sink failed: {0}")]
    Sink(#[source] ProviderError),
}
