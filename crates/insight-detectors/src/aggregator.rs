//! Pattern aggregator: the join point after the detector fan-out

use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, warn};

use insight_core::{AnalysisConfig, EntityId, Pattern, PatternType};

use crate::detector::DetectorResult;

/// Result of aggregating all detector outputs
#[derive(Debug, Default)]
pub struct AggregateOutcome {
    /// Canonical, deduplicated, invariant-checked patterns in
    /// deterministic order
    pub patterns: Vec<Pattern>,
    /// Exact duplicates dropped (same type + participant set)
    pub duplicates_dropped: usize,
    /// Records dropped for violating a schema invariant
    pub invariant_rejected: usize,
    /// Detectors whose contribution was lost to an error
    pub failed_detectors: Vec<&'static str>,
}

/// Merges detector outputs into the canonical pattern set
///
/// A failed detector is logged by name and contributes nothing; records
/// violating invariants are dropped and counted, never repaired beyond
/// confidence clamping.
pub struct PatternAggregator<'a> {
    config: &'a AnalysisConfig,
    known_entities: &'a HashSet<EntityId>,
}

impl<'a> PatternAggregator<'a> {
    pub fn new(config: &'a AnalysisConfig, known_entities: &'a HashSet<EntityId>) -> Self {
        Self {
            config,
            known_entities,
        }
    }

    pub fn aggregate(
        &self,
        results: Vec<(&'static str, DetectorResult<Vec<Pattern>>)>,
    ) -> AggregateOutcome {
        let mut outcome = AggregateOutcome::default();
        let mut canonical: IndexMap<(PatternType, Vec<EntityId>), Pattern> = IndexMap::new();

        for (detector, result) in results {
            let patterns = match result {
                Ok(patterns) => patterns,
                Err(error) => {
                    warn!(detector, %error, "detector failed; continuing without it");
                    outcome.failed_detectors.push(detector);
                    continue;
                }
            };

            for mut pattern in patterns {
                pattern.confidence = pattern.confidence.clamp(0.0, 1.0);

                if let Some(reason) = self.invariant_violation(&pattern) {
                    debug!(
                        detector,
                        pattern_id = %pattern.pattern_id,
                        reason,
                        "pattern rejected"
                    );
                    outcome.invariant_rejected += 1;
                    continue;
                }

                match canonical.entry(pattern.dedup_key()) {
                    indexmap::map::Entry::Vacant(entry) => {
                        entry.insert(pattern);
                    }
                    indexmap::map::Entry::Occupied(mut entry) => {
                        outcome.duplicates_dropped += 1;
                        if pattern.confidence > entry.get().confidence {
                            entry.insert(pattern);
                        }
                    }
                }
            }
        }

        let mut patterns: Vec<Pattern> = canonical.into_values().collect();
        patterns.sort_by(|a, b| {
            a.pattern_type
                .cmp(&b.pattern_type)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| b.support.cmp(&a.support))
                .then_with(|| a.participants.cmp(&b.participants))
        });
        outcome.patterns = patterns;
        outcome
    }

    fn invariant_violation(&self, pattern: &Pattern) -> Option<&'static str> {
        if pattern.support < self.config.min_support {
            return Some("support below min_support");
        }
        if pattern.participants.is_empty() {
            return Some("no participants");
        }
        let mut seen = HashSet::new();
        for participant in &pattern.participants {
            if !seen.insert(participant) {
                return Some("duplicate participant");
            }
            if !self.known_entities.contains(participant) {
                return Some("unknown participant entity");
            }
        }
        if let Some(stats) = &pattern.variance_stats {
            if stats.std_offset_minutes > self.config.max_variance_minutes {
                return Some("timing std above max_variance_minutes");
            }
        }
        None
    }
}
