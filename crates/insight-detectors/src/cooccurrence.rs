//! Co-occurrence detector: paired state changes within a sliding window

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde_json::json;
use tracing::debug;

use insight_core::{
    AnalysisConfig, EntityId, EventSnapshot, Pattern, PatternType, VarianceStats,
};

use crate::detector::{mean_std, Detector, DetectorResult};

/// Directed observation record for one (trigger, target) pair
#[derive(Default)]
struct PairStats {
    /// Minutes from each trigger change to the first target change that
    /// followed it inside the window
    deltas: Vec<f64>,
}

/// Detects entity pairs that repeatedly change state within a sliding
/// window
///
/// For each directed pair (a -> b): every change of `a` that is followed by
/// a change of `b` within `window_minutes` counts once, with the delta to
/// b's first change recorded. `confidence = P(b within W | a)` =
/// matches / changes of a. Pairs are rejected when support is below
/// `min_support` or the delta spread exceeds `max_variance_minutes`; per
/// unordered pair only the stronger direction is emitted.
pub struct CoOccurrenceDetector {
    run_started_at: DateTime<Utc>,
}

impl CoOccurrenceDetector {
    pub fn new(run_started_at: DateTime<Utc>) -> Self {
        Self { run_started_at }
    }

    fn directed_stats(
        snapshot: &EventSnapshot,
        window: Duration,
    ) -> IndexMap<(EntityId, EntityId), PairStats> {
        let events = snapshot.events();
        let mut stats: IndexMap<(EntityId, EntityId), PairStats> = IndexMap::new();
        let mut seen: Vec<&EntityId> = Vec::new();

        for (i, trigger) in events.iter().enumerate() {
            let horizon = trigger.timestamp + window;
            seen.clear();
            for target in &events[i + 1..] {
                if target.timestamp > horizon {
                    break;
                }
                if target.entity_id == trigger.entity_id {
                    continue;
                }
                // Only the first target change per trigger change counts.
                if seen.contains(&&target.entity_id) {
                    continue;
                }
                seen.push(&target.entity_id);

                let delta_minutes =
                    (target.timestamp - trigger.timestamp).num_seconds() as f64 / 60.0;
                stats
                    .entry((trigger.entity_id.clone(), target.entity_id.clone()))
                    .or_default()
                    .deltas
                    .push(delta_minutes);
            }
        }
        stats
    }
}

impl Detector for CoOccurrenceDetector {
    fn name(&self) -> &'static str {
        "co_occurrence"
    }

    fn detect(
        &self,
        events: &EventSnapshot,
        config: &AnalysisConfig,
    ) -> DetectorResult<Vec<Pattern>> {
        let window = Duration::minutes(config.window_minutes as i64);
        let by_entity = events.changes_by_entity();
        let stats = Self::directed_stats(events, window);

        // Strongest direction per unordered pair.
        let mut best: IndexMap<(EntityId, EntityId), Pattern> = IndexMap::new();

        for ((trigger, target), pair) in stats {
            let support = pair.deltas.len() as u32;
            if support < config.min_support {
                continue;
            }

            let trigger_changes = by_entity
                .get(&trigger)
                .map(|times| times.len())
                .unwrap_or(0);
            if trigger_changes == 0 {
                continue;
            }
            let confidence = (support as f64 / trigger_changes as f64).min(1.0);

            let (mean, std) = mean_std(&pair.deltas);
            if std > config.max_variance_minutes {
                debug!(
                    trigger = %trigger,
                    target = %target,
                    std_minutes = std,
                    "pair rejected: timing spread too wide"
                );
                continue;
            }

            let mut metadata = serde_json::Map::new();
            metadata.insert("window_minutes".into(), json!(config.window_minutes));
            metadata.insert("time_variance_minutes".into(), json!(std * std));
            metadata.insert("time_std_minutes".into(), json!(std));
            metadata.insert("trigger".into(), json!(trigger.as_str()));
            metadata.insert("target".into(), json!(target.as_str()));

            let pattern = Pattern::new(
                PatternType::CoOccurrence,
                vec![trigger.clone(), target.clone()],
                confidence,
                support,
                Some(VarianceStats {
                    mean_offset_minutes: mean,
                    std_offset_minutes: std,
                }),
                metadata,
                self.run_started_at,
                self.version(),
            );

            let key = if trigger <= target {
                (trigger, target)
            } else {
                (target, trigger)
            };
            match best.get(&key) {
                Some(existing)
                    if (existing.confidence, existing.support)
                        >= (pattern.confidence, pattern.support) => {}
                _ => {
                    best.insert(key, pattern);
                }
            }
        }

        let mut patterns: Vec<Pattern> = best.into_values().collect();
        patterns.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.support.cmp(&a.support))
                .then_with(|| a.participants.cmp(&b.participants))
        });
        Ok(patterns)
    }
}
