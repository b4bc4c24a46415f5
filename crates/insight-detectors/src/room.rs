//! Room-based detector: correlated usage within a shared area

use chrono::{DateTime, Duration, Utc};
use indexmap::{IndexMap, IndexSet};
use serde_json::json;

use insight_core::{AnalysisConfig, EntityId, EventSnapshot, Pattern, PatternType, StateChange};

use crate::detector::{Detector, DetectorResult};

/// Flags areas where multiple entities repeatedly change together
///
/// Events are grouped by `area_id` and clustered into activity windows
/// (a window starts at an event and spans `window_minutes`). A window
/// counts as correlated when at least two distinct entities change inside
/// it. Confidence is the share of the area's activity windows that are
/// correlated; participants are the entities present in at least a
/// quarter of the correlated windows.
pub struct RoomBasedDetector {
    run_started_at: DateTime<Utc>,
}

impl RoomBasedDetector {
    pub fn new(run_started_at: DateTime<Utc>) -> Self {
        Self { run_started_at }
    }
}

impl Detector for RoomBasedDetector {
    fn name(&self) -> &'static str {
        "room_based"
    }

    fn detect(
        &self,
        events: &EventSnapshot,
        config: &AnalysisConfig,
    ) -> DetectorResult<Vec<Pattern>> {
        let window = Duration::minutes(config.window_minutes as i64);

        let mut by_area: IndexMap<String, Vec<&StateChange>> = IndexMap::new();
        for event in events.events() {
            if let Some(area) = &event.area_id {
                by_area.entry(area.clone()).or_default().push(event);
            }
        }

        let mut patterns = Vec::new();
        for (area_id, area_events) in by_area {
            // Cluster into activity windows anchored at the first event of
            // each cluster (area_events inherit canonical time order).
            let mut windows: Vec<IndexSet<&EntityId>> = Vec::new();
            let mut current: Option<(DateTime<Utc>, IndexSet<&EntityId>)> = None;
            for event in &area_events {
                match current.as_mut() {
                    Some((end, set)) if event.timestamp <= *end => {
                        set.insert(&event.entity_id);
                    }
                    _ => {
                        if let Some((_, set)) = current.take() {
                            windows.push(set);
                        }
                        let mut set = IndexSet::new();
                        set.insert(&event.entity_id);
                        current = Some((event.timestamp + window, set));
                    }
                }
            }
            if let Some((_, set)) = current {
                windows.push(set);
            }

            let total = windows.len();
            let correlated: Vec<&IndexSet<&EntityId>> =
                windows.iter().filter(|w| w.len() >= 2).collect();
            let support = correlated.len() as u32;
            if support < config.min_support || total == 0 {
                continue;
            }
            let confidence = support as f64 / total as f64;

            // Entities that show up in a meaningful share of the
            // correlated windows.
            let mut appearances: IndexMap<&EntityId, usize> = IndexMap::new();
            for window_set in &correlated {
                for entity in window_set.iter() {
                    *appearances.entry(entity).or_insert(0) += 1;
                }
            }
            let floor = (correlated.len().div_ceil(4)).max(1);
            let mut participants: Vec<EntityId> = appearances
                .iter()
                .filter(|(_, count)| **count >= floor)
                .map(|(entity, _)| (*entity).clone())
                .collect();
            participants.sort_unstable();
            if participants.len() < 2 {
                continue;
            }

            let mut metadata = serde_json::Map::new();
            metadata.insert("area_id".into(), json!(area_id));
            metadata.insert("active_windows".into(), json!(total));

            patterns.push(Pattern::new(
                PatternType::RoomBased,
                participants,
                confidence,
                support,
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
