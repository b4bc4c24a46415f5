//! Synergy opportunity records produced by the pair/chain/context layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::EntityId;

/// Kind of synergy opportunity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynergyType {
    DevicePair,
    DeviceChain,
    WeatherContext,
    EnergyContext,
    EventContext,
    /// Reserved for scene suggestions; no producer in this workspace yet.
    SceneBased,
}

impl SynergyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SynergyType::DevicePair => "device_pair",
            SynergyType::DeviceChain => "device_chain",
            SynergyType::WeatherContext => "weather_context",
            SynergyType::EnergyContext => "energy_context",
            SynergyType::EventContext => "event_context",
            SynergyType::SceneBased => "scene_based",
        }
    }
}

/// A candidate multi-device relationship not yet encoded as an automation
///
/// `score_breakdown` keys are component names (compatibility, usage, area,
/// reliability, weather, ...) mapped to their contribution; a `BTreeMap`
/// keeps serialization order deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynergyOpportunity {
    /// Stable content hash of type + ordered participants
    pub synergy_id: String,

    pub synergy_type: SynergyType,

    /// Ordered participants: (trigger, action) for pairs, full path for
    /// chains (always >= 3 entries for chains)
    pub participants: Vec<EntityId>,

    /// Blended score in [0, 1]
    pub impact_score: f64,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub score_breakdown: BTreeMap<String, f64>,

    /// True when an existing automation already covers this combination
    /// (only emitted under force_rediscovery)
    pub validated_by_automation: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub automation_ids: Vec<String>,

    pub created_at: DateTime<Utc>,
}

impl SynergyOpportunity {
    pub fn new(
        synergy_type: SynergyType,
        participants: Vec<EntityId>,
        impact_score: f64,
        score_breakdown: BTreeMap<String, f64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let synergy_id = Self::stable_id(synergy_type, &participants);
        Self {
            synergy_id,
            synergy_type,
            participants,
            impact_score,
            score_breakdown,
            validated_by_automation: false,
            automation_ids: Vec::new(),
            created_at,
        }
    }

    /// Deterministic id: sha256 over type and participants in order
    ///
    /// Order matters here, unlike pattern ids: (motion -> light) and
    /// (light -> motion) are different opportunities.
    pub fn stable_id(synergy_type: SynergyType, participants: &[EntityId]) -> String {
        let joined: Vec<&str> = participants.iter().map(|p| p.as_str()).collect();
        let mut hasher = Sha256::new();
        hasher.update(synergy_type.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(joined.join(",").as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Mark as already covered by the given automations
    pub fn validated_by(mut self, automation_ids: Vec<String>) -> Self {
        self.validated_by_automation = true;
        self.automation_ids = automation_ids;
        self
    }

    /// Rebuild with a different type, recomputing the id
    ///
    /// Used by the context augmenter when the dominant signal retypes an
    /// opportunity.
    pub fn retyped(mut self, synergy_type: SynergyType) -> Self {
        self.synergy_type = synergy_type;
        self.synergy_id = Self::stable_id(synergy_type, &self.participants);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    #[test]
    fn test_stable_id_is_order_sensitive() {
        let ab = SynergyOpportunity::stable_id(
            SynergyType::DevicePair,
            &[entity("binary_sensor.motion"), entity("light.kitchen")],
        );
        let ba = SynergyOpportunity::stable_id(
            SynergyType::DevicePair,
            &[entity("light.kitchen"), entity("binary_sensor.motion")],
        );
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_retyped_changes_id() {
        let s = SynergyOpportunity::new(
            SynergyType::DevicePair,
            vec![entity("binary_sensor.motion"), entity("light.kitchen")],
            0.7,
            BTreeMap::new(),
            Utc::now(),
        );
        let original_id = s.synergy_id.clone();
        let retyped = s.retyped(SynergyType::WeatherContext);
        assert_ne!(retyped.synergy_id, original_id);
        assert_eq!(retyped.synergy_type, SynergyType::WeatherContext);
    }

    #[test]
    fn test_validated_by() {
        let s = SynergyOpportunity::new(
            SynergyType::DevicePair,
            vec![entity("binary_sensor.motion"), entity("light.kitchen")],
            0.7,
            BTreeMap::new(),
            Utc::now(),
        )
        .validated_by(vec!["automation.kitchen_motion".to_string()]);
        assert!(s.validated_by_automation);
        assert_eq!(s.automation_ids.len(), 1);
    }
}
