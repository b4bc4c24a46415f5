//! Day-type detector: weekday vs weekend behavior splits

use chrono::{DateTime, Datelike, Utc, Weekday};
use serde_json::json;

use insight_core::{AnalysisConfig, EventSnapshot, Pattern, PatternType};

use crate::detector::{Detector, DetectorResult};

/// Share of days that are weekdays; the null hypothesis for an entity with
/// no day-type preference.
const WEEKDAY_BASELINE: f64 = 5.0 / 7.0;

/// Flags entities whose usage leans on weekdays or weekends
///
/// Splits each entity's changes into weekday and weekend counts and
/// compares the weekday share against the 5/7 baseline. Entities whose
/// absolute deviation reaches `day_type_bias` (with at least `min_support`
/// total changes) get a `day_type` pattern; confidence scales the
/// deviation by the maximum possible deviation.
pub struct DayTypeDetector {
    run_started_at: DateTime<Utc>,
}

impl DayTypeDetector {
    pub fn new(run_started_at: DateTime<Utc>) -> Self {
        Self { run_started_at }
    }
}

fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}

impl Detector for DayTypeDetector {
    fn name(&self) -> &'static str {
        "day_type"
    }

    fn detect(
        &self,
        events: &EventSnapshot,
        config: &AnalysisConfig,
    ) -> DetectorResult<Vec<Pattern>> {
        let mut patterns = Vec::new();

        for (entity, times) in events.changes_by_entity() {
            let total = times.len();
            if (total as u32) < config.min_support {
                continue;
            }

            let weekend = times
                .iter()
                .filter(|t| is_weekend(t.weekday()))
                .count();
            let weekday = total - weekend;

            let weekday_share = weekday as f64 / total as f64;
            let deviation = (weekday_share - WEEKDAY_BASELINE).abs();
            if deviation < config.day_type_bias {
                continue;
            }

            let (dominant, dominant_count) = if weekday_share > WEEKDAY_BASELINE {
                ("weekday", weekday)
            } else {
                ("weekend", weekend)
            };
            // Max deviation is hitting 0% or 100% weekday share.
            let max_deviation = WEEKDAY_BASELINE.max(1.0 - WEEKDAY_BASELINE);
            let confidence = (deviation / max_deviation).min(1.0);

            let mut metadata = serde_json::Map::new();
            metadata.insert("weekday_events".into(), json!(weekday));
            metadata.insert("weekend_events".into(), json!(weekend));
            metadata.insert("dominant".into(), json!(dominant));

            patterns.push(Pattern::new(
                PatternType::DayType,
                vec![entity],
                confidence,
                dominant_count as u32,
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
