//! Contextual detector: usage correlated with external context buckets

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::json;

use insight_core::{
    AnalysisConfig, ContextObservation, EntityId, EventSnapshot, Pattern, PatternType,
};

use crate::detector::{Detector, DetectorResult};

/// Correlates entity usage with externally supplied context buckets
///
/// Observations state that a bucket (e.g. weather "cold") was active from
/// a point in time until the next observation of the same signal. For
/// each (entity, bucket) the detector compares the entity's share of
/// events inside the bucket against the bucket's share of all events;
/// a lift of `context_lift` or more (with `min_support` events in the
/// bucket) yields a `contextual` pattern. With no observations supplied
/// the detector degrades to an empty result.
pub struct ContextualDetector {
    observations: Vec<ContextObservation>,
    run_started_at: DateTime<Utc>,
}

impl ContextualDetector {
    pub fn new(mut observations: Vec<ContextObservation>, run_started_at: DateTime<Utc>) -> Self {
        observations.sort_by_key(|o| o.from);
        Self {
            observations,
            run_started_at,
        }
    }

    /// Bucket active at `at` for each signal: the latest observation at or
    /// before that instant
    fn buckets_at(&self, at: DateTime<Utc>) -> Vec<&ContextObservation> {
        let mut active: IndexMap<&'static str, &ContextObservation> = IndexMap::new();
        for obs in &self.observations {
            if obs.from > at {
                break;
            }
            active.insert(obs.signal.as_str(), obs);
        }
        active.into_values().collect()
    }
}

impl Detector for ContextualDetector {
    fn name(&self) -> &'static str {
        "contextual"
    }

    fn detect(
        &self,
        events: &EventSnapshot,
        config: &AnalysisConfig,
    ) -> DetectorResult<Vec<Pattern>> {
        if self.observations.is_empty() || events.is_empty() {
            return Ok(Vec::new());
        }

        let total_events = events.len() as f64;
        // (entity, signal, bucket) -> event count, plus marginals.
        let mut joint: IndexMap<(EntityId, &'static str, String), u32> = IndexMap::new();
        let mut bucket_totals: IndexMap<(&'static str, String), u32> = IndexMap::new();
        let mut entity_totals: IndexMap<EntityId, u32> = IndexMap::new();

        for event in events.events() {
            *entity_totals.entry(event.entity_id.clone()).or_insert(0) += 1;
            for obs in self.buckets_at(event.timestamp) {
                let signal = obs.signal.as_str();
                *joint
                    .entry((event.entity_id.clone(), signal, obs.bucket.clone()))
                    .or_insert(0) += 1;
                *bucket_totals
                    .entry((signal, obs.bucket.clone()))
                    .or_insert(0) += 1;
            }
        }

        let mut patterns = Vec::new();
        for ((entity, signal, bucket), count) in joint {
            if count < config.min_support {
                continue;
            }
            let entity_total = entity_totals.get(&entity).copied().unwrap_or(0) as f64;
            let bucket_total = bucket_totals
                .get(&(signal, bucket.clone()))
                .copied()
                .unwrap_or(0) as f64;
            if entity_total == 0.0 || bucket_total == 0.0 {
                continue;
            }

            // How much more of this entity's usage falls in the bucket
            // than the bucket's overall share of activity.
            let entity_share = count as f64 / entity_total;
            let bucket_share = bucket_total / total_events;
            if bucket_share <= 0.0 {
                continue;
            }
            let lift = entity_share / bucket_share;
            if lift < config.context_lift {
                continue;
            }

            let mut metadata = serde_json::Map::new();
            metadata.insert("signal".into(), json!(signal));
            metadata.insert("bucket".into(), json!(bucket));
            metadata.insert("lift".into(), json!(lift));

            patterns.push(Pattern::new(
                PatternType::Contextual,
                vec![entity],
                entity_share.min(1.0),
                count,
                None,
                metadata,
                self.run_started_at,
                self.version(),
            ));
        }

        patterns.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.support.cmp(&a.support))
                .then_with(|| a.participants.cmp(&b.participants))
        });
        Ok(patterns)
    }
}
