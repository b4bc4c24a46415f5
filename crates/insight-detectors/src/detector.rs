//! The shared detector contract

use chrono::{DateTime, Utc};
use thiserror::Error;

use insight_core::{
    AnalysisConfig, ContextObservation, DetectorKind, EventSnapshot, Pattern,
};

use crate::{
    ContextualDetector, CoOccurrenceDetector, DayTypeDetector, RoomBasedDetector,
    SequenceDetector, TimeOfDayDetector,
};

/// Detector errors
///
/// A detector failure is always recoverable at the run level: the engine
/// logs it by component name and continues with that detector's
/// contribution empty.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector '{detector}' failed: {reason}")]
    Failed {
        detector: &'static str,
        reason: String,
    },
}

/// Result type for detector operations
pub type DetectorResult<T> = Result<T, DetectorError>;

/// Capability contract shared by every detector
///
/// `detect` must be pure with respect to the snapshot: no interior
/// mutability, no ordering dependence beyond the snapshot's canonical
/// order, so identical inputs always yield identical patterns.
pub trait Detector: Send + Sync {
    /// Component name used in logs and failure isolation
    fn name(&self) -> &'static str;

    /// Version recorded on emitted patterns; bump when the algorithm
    /// changes in a way that should re-key stored pattern ids
    fn version(&self) -> &'static str {
        "1"
    }

    fn detect(
        &self,
        events: &EventSnapshot,
        config: &AnalysisConfig,
    ) -> DetectorResult<Vec<Pattern>>;
}

/// Instantiate the detectors enabled by the config, in config order
///
/// The set of implementations is fixed; the config list only selects
/// among them. `run_started_at` is stamped onto every emitted pattern so
/// one run produces one consistent `created_at`. Context observations are
/// only consumed by the contextual detector and may be empty.
pub fn build_detectors(
    config: &AnalysisConfig,
    context_observations: &[ContextObservation],
    run_started_at: DateTime<Utc>,
) -> Vec<Box<dyn Detector>> {
    config
        .enabled_detectors
        .iter()
        .map(|kind| -> Box<dyn Detector> {
            match kind {
                DetectorKind::CoOccurrence => {
                    Box::new(CoOccurrenceDetector::new(run_started_at))
                }
                DetectorKind::TimeOfDay => Box::new(TimeOfDayDetector::new(run_started_at)),
                DetectorKind::Sequence => Box::new(SequenceDetector::new(run_started_at)),
                DetectorKind::RoomBased => Box::new(RoomBasedDetector::new(run_started_at)),
                DetectorKind::DayType => Box::new(DayTypeDetector::new(run_started_at)),
                DetectorKind::Contextual => Box::new(ContextualDetector::new(
                    context_observations.to_vec(),
                    run_started_at,
                )),
            }
        })
        .collect()
}

/// Mean and sample-ish standard deviation of a series
///
/// Population std (divide by n): detectors reason about the observed
/// history itself, not an estimate of a wider population.
pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_std_basic() {
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-9);
        assert!((std - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_mean_std_empty_and_single() {
        assert_eq!(mean_std(&[]), (0.0, 0.0));
        assert_eq!(mean_std(&[3.0]), (3.0, 0.0));
    }

    #[test]
    fn test_build_detectors_respects_config_list() {
        let mut config = AnalysisConfig::default();
        config.enabled_detectors = vec![DetectorKind::TimeOfDay, DetectorKind::CoOccurrence];
        let detectors = build_detectors(&config, &[], Utc::now());
        let names: Vec<&str> = detectors.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["time_of_day", "co_occurrence"]);
    }
}
