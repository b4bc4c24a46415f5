//! Pattern records emitted by the detector family

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::EntityId;

/// Kind of detected pattern
///
/// `session`, `duration`, `seasonal` and `anomaly` are part of the stored
/// taxonomy for downstream consumers; no detector in this workspace emits
/// them yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    CoOccurrence,
    TimeOfDay,
    Sequence,
    Contextual,
    RoomBased,
    DayType,
    Session,
    Duration,
    Seasonal,
    Anomaly,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::CoOccurrence => "co_occurrence",
            PatternType::TimeOfDay => "time_of_day",
            PatternType::Sequence => "sequence",
            PatternType::Contextual => "contextual",
            PatternType::RoomBased => "room_based",
            PatternType::DayType => "day_type",
            PatternType::Session => "session",
            PatternType::Duration => "duration",
            PatternType::Seasonal => "seasonal",
            PatternType::Anomaly => "anomaly",
        }
    }

    /// Whether participant order is meaningful for this pattern type
    pub fn is_ordered(&self) -> bool {
        matches!(self, PatternType::Sequence | PatternType::Session)
    }
}

/// Timing spread of a pattern's occurrences, in minutes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarianceStats {
    pub mean_offset_minutes: f64,
    pub std_offset_minutes: f64,
}

/// A detected behavioral pattern
///
/// Records are created fresh each run and handed to the persistence
/// collaborator; nothing in this workspace mutates a stored pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Stable content hash: identical participants + type + detector
    /// version always produce the same id across runs
    pub pattern_id: String,

    pub pattern_type: PatternType,

    /// Participating entities; order is meaningful iff
    /// `pattern_type.is_ordered()`
    pub participants: Vec<EntityId>,

    /// Conditional-probability estimate in [0, 1]
    pub confidence: f64,

    /// Observed occurrence count
    pub support: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub variance_stats: Option<VarianceStats>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,

    pub detector_version: String,
}

impl Pattern {
    /// Build a pattern with its stable id derived from content
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pattern_type: PatternType,
        participants: Vec<EntityId>,
        confidence: f64,
        support: u32,
        variance_stats: Option<VarianceStats>,
        metadata: serde_json::Map<String, serde_json::Value>,
        created_at: DateTime<Utc>,
        detector_version: impl Into<String>,
    ) -> Self {
        let detector_version = detector_version.into();
        let pattern_id = Self::stable_id(pattern_type, &participants, &detector_version);
        Self {
            pattern_id,
            pattern_type,
            participants,
            confidence,
            support,
            variance_stats,
            metadata,
            created_at,
            detector_version,
        }
    }

    /// Deterministic id: sha256 over type, sorted participants and
    /// detector version
    pub fn stable_id(
        pattern_type: PatternType,
        participants: &[EntityId],
        detector_version: &str,
    ) -> String {
        let mut sorted: Vec<&str> = participants.iter().map(|p| p.as_str()).collect();
        sorted.sort_unstable();
        let mut hasher = Sha256::new();
        hasher.update(pattern_type.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(sorted.join(",").as_bytes());
        hasher.update(b"|");
        hasher.update(detector_version.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Key used by the aggregator to drop exact duplicates: same type and
    /// participant set regardless of order
    pub fn dedup_key(&self) -> (PatternType, Vec<EntityId>) {
        let mut sorted = self.participants.clone();
        sorted.sort_unstable();
        (self.pattern_type, sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    #[test]
    fn test_stable_id_is_order_independent() {
        let a = Pattern::stable_id(
            PatternType::CoOccurrence,
            &[entity("light.a"), entity("sensor.b")],
            "1",
        );
        let b = Pattern::stable_id(
            PatternType::CoOccurrence,
            &[entity("sensor.b"), entity("light.a")],
            "1",
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_stable_id_varies_by_type_and_version() {
        let participants = [entity("light.a"), entity("sensor.b")];
        let co = Pattern::stable_id(PatternType::CoOccurrence, &participants, "1");
        let seq = Pattern::stable_id(PatternType::Sequence, &participants, "1");
        let v2 = Pattern::stable_id(PatternType::CoOccurrence, &participants, "2");
        assert_ne!(co, seq);
        assert_ne!(co, v2);
    }

    #[test]
    fn test_dedup_key_ignores_order() {
        let now = Utc::now();
        let p1 = Pattern::new(
            PatternType::CoOccurrence,
            vec![entity("light.a"), entity("sensor.b")],
            0.9,
            8,
            None,
            serde_json::Map::new(),
            now,
            "1",
        );
        let p2 = Pattern::new(
            PatternType::CoOccurrence,
            vec![entity("sensor.b"), entity("light.a")],
            0.7,
            5,
            None,
            serde_json::Map::new(),
            now,
            "1",
        );
        assert_eq!(p1.dedup_key(), p2.dedup_key());
    }

    #[test]
    fn test_serde_shape() {
        let p = Pattern::new(
            PatternType::TimeOfDay,
            vec![entity("light.porch")],
            0.8,
            12,
            Some(VarianceStats {
                mean_offset_minutes: 4.0,
                std_offset_minutes: 2.5,
            }),
            serde_json::Map::new(),
            Utc::now(),
            "1",
        );
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["pattern_type"], "time_of_day");
        assert_eq!(json["participants"][0], "light.porch");
    }
}
