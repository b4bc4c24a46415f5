//! Sequence detector: repeated ordered multi-step chains

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde_json::json;

use insight_core::{AnalysisConfig, EntityId, EventSnapshot, Pattern, PatternType};

use crate::detector::{Detector, DetectorResult};

/// Finds ordered three-step chains (A -> B -> C) that repeat within short
/// spans
///
/// Walks the canonical event order; for every event, the next two changes
/// of distinct other entities inside `window_minutes` form a candidate
/// triple. Triples repeating at least `min_sequence_repeats` times are
/// emitted with participants in order. Note the aggregator still applies
/// the global `min_support` floor.
pub struct SequenceDetector {
    run_started_at: DateTime<Utc>,
}

impl SequenceDetector {
    pub fn new(run_started_at: DateTime<Utc>) -> Self {
        Self { run_started_at }
    }
}

impl Detector for SequenceDetector {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn detect(
        &self,
        events: &EventSnapshot,
        config: &AnalysisConfig,
    ) -> DetectorResult<Vec<Pattern>> {
        let window = Duration::minutes(config.window_minutes as i64);
        let all = events.events();

        let mut counts: IndexMap<[EntityId; 3], u32> = IndexMap::new();
        let mut first_starts: IndexMap<EntityId, u32> = IndexMap::new();

        for (i, first) in all.iter().enumerate() {
            let horizon = first.timestamp + window;
            let mut chain: Vec<&EntityId> = vec![&first.entity_id];
            for next in &all[i + 1..] {
                if next.timestamp > horizon {
                    break;
                }
                if chain.contains(&&next.entity_id) {
                    continue;
                }
                chain.push(&next.entity_id);
                if chain.len() == 3 {
                    break;
                }
            }
            if chain.len() == 3 {
                let key = [chain[0].clone(), chain[1].clone(), chain[2].clone()];
                *counts.entry(key).or_insert(0) += 1;
                *first_starts.entry(first.entity_id.clone()).or_insert(0) += 1;
            }
        }

        let mut patterns = Vec::new();
        for (participants, repeats) in counts {
            if repeats < config.min_sequence_repeats {
                continue;
            }
            let starts = first_starts.get(&participants[0]).copied().unwrap_or(0);
            let confidence = if starts == 0 {
                0.0
            } else {
                (repeats as f64 / starts as f64).min(1.0)
            };

            let mut metadata = serde_json::Map::new();
            metadata.insert("window_minutes".into(), json!(config.window_minutes));
            metadata.insert("steps".into(), json!(participants.len()));

            patterns.push(Pattern::new(
                PatternType::Sequence,
                participants.to_vec(),
                confidence,
                repeats,
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use insight_core::StateChange;

    fn change(entity: &str, day: u32, hour: u32, minute: u32) -> StateChange {
        StateChange {
            entity_id: entity.parse().unwrap(),
            area_id: None,
            timestamp: Utc.with_ymd_and_hms(2026, 3, day, hour, minute, 0).unwrap(),
            state: "on".to_string(),
            previous_state: None,
        }
    }

    fn bedtime_routine(days: u32) -> Vec<StateChange> {
        let mut events = Vec::new();
        for day in 1..=days {
            events.push(change("light.hallway", day, 22, 0));
            events.push(change("light.bedroom", day, 22, 2));
            events.push(change("switch.charger", day, 22, 4));
        }
        events
    }

    #[test]
    fn test_repeated_triple_detected_in_order() {
        let mut config = AnalysisConfig::default();
        config.min_support = 3;
        let patterns = SequenceDetector::new(Utc::now())
            .detect(&EventSnapshot::new(bedtime_routine(6)), &config)
            .unwrap();

        // The dominant triple is the full routine starting at the hallway.
        let routine = patterns
            .iter()
            .find(|p| p.participants[0].as_str() == "light.hallway")
            .expect("routine triple present");
        assert_eq!(routine.pattern_type, PatternType::Sequence);
        assert_eq!(routine.support, 6);
        assert!((routine.confidence - 1.0).abs() < 1e-9);
        let names: Vec<&str> = routine.participants.iter().map(|p| p.as_str()).collect();
        assert_eq!(
            names,
            vec!["light.hallway", "light.bedroom", "switch.charger"]
        );
    }

    #[test]
    fn test_below_repeat_threshold_skipped() {
        let config = AnalysisConfig::default();
        let patterns = SequenceDetector::new(Utc::now())
            .detect(&EventSnapshot::new(bedtime_routine(2)), &config)
            .unwrap();
        assert!(patterns.is_empty());
    }

    #[test]
    fn test_steps_outside_window_break_the_chain() {
        let config = AnalysisConfig::default();
        let mut events = Vec::new();
        for day in 1..=6 {
            events.push(change("light.hallway", day, 22, 0));
            events.push(change("light.bedroom", day, 22, 2));
            // 26 minutes after the first step: outside the 5 minute window.
            events.push(change("switch.charger", day, 22, 26));
        }
        let patterns = SequenceDetector::new(Utc::now())
            .detect(&EventSnapshot::new(events), &config)
            .unwrap();
        assert!(patterns.is_empty());
    }
}
