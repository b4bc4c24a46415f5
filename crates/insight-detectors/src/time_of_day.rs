//! Time-of-day detector: entities with concentrated usage hours

use chrono::{DateTime, Timelike, Utc};
use serde_json::json;

use insight_core::{
    AnalysisConfig, EventSnapshot, Pattern, PatternType, VarianceStats,
};

use crate::detector::{mean_std, Detector, DetectorResult};

/// Flags entities whose usage concentrates in one hour of the day
///
/// Buckets each entity's changes by hour; when the busiest hour holds at
/// least `time_of_day_concentration` of all changes (and at least
/// `min_support` events), a `time_of_day` pattern is emitted. Confidence
/// is the concentration itself; variance stats describe the minute spread
/// inside the peak hour.
pub struct TimeOfDayDetector {
    run_started_at: DateTime<Utc>,
}

impl TimeOfDayDetector {
    pub fn new(run_started_at: DateTime<Utc>) -> Self {
        Self { run_started_at }
    }
}

impl Detector for TimeOfDayDetector {
    fn name(&self) -> &'static str {
        "time_of_day"
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

            let mut histogram = [0usize; 24];
            for time in &times {
                histogram[time.hour() as usize] += 1;
            }

            // Lowest hour wins ties so the choice is deterministic.
            let (peak_hour, peak_count) = histogram
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(&a.0)))
                .map(|(hour, count)| (hour as u32, *count))
                .unwrap_or((0, 0));

            let concentration = peak_count as f64 / total as f64;
            if concentration < config.time_of_day_concentration
                || (peak_count as u32) < config.min_support
            {
                continue;
            }

            // Minute offsets within the peak hour (0..60).
            let offsets: Vec<f64> = times
                .iter()
                .filter(|t| t.hour() == peak_hour)
                .map(|t| t.minute() as f64 + t.second() as f64 / 60.0)
                .collect();
            let (mean, std) = mean_std(&offsets);

            let mut metadata = serde_json::Map::new();
            metadata.insert("peak_hour".into(), json!(peak_hour));
            metadata.insert("total_events".into(), json!(total));

            patterns.push(Pattern::new(
                PatternType::TimeOfDay,
                vec![entity],
                concentration,
                peak_count as u32,
                Some(VarianceStats {
                    mean_offset_minutes: mean,
                    std_offset_minutes: std,
                }),
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

    #[test]
    fn test_concentrated_entity_flagged() {
        let config = AnalysisConfig::default();
        let mut events = Vec::new();
        // Porch light comes on around 19:00 every evening for 10 days.
        for day in 1..=10 {
            events.push(change("light.porch", day, 19, day % 8));
        }

        let patterns = TimeOfDayDetector::new(Utc::now())
            .detect(&EventSnapshot::new(events), &config)
            .unwrap();

        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.pattern_type, PatternType::TimeOfDay);
        assert_eq!(p.metadata["peak_hour"], 19);
        assert!((p.confidence - 1.0).abs() < 1e-9);
        assert!(p.variance_stats.unwrap().std_offset_minutes <= 30.0);
    }

    #[test]
    fn test_uniform_usage_not_flagged() {
        let config = AnalysisConfig::default();
        let mut events = Vec::new();
        // Spread evenly over six different hours.
        for day in 1..=6 {
            for hour in [3, 7, 11, 15, 19, 23] {
                events.push(change("switch.pump", day, hour, 0));
            }
        }

        let patterns = TimeOfDayDetector::new(Utc::now())
            .detect(&EventSnapshot::new(events), &config)
            .unwrap();
        assert!(patterns.is_empty());
    }

    #[test]
    fn test_sparse_entity_skipped() {
        let config = AnalysisConfig::default();
        let events = vec![
            change("light.attic", 1, 20, 0),
            change("light.attic", 2, 20, 0),
        ];
        let patterns = TimeOfDayDetector::new(Utc::now())
            .detect(&EventSnapshot::new(events), &config)
            .unwrap();
        assert!(patterns.is_empty());
    }
}
