//! Device-pair synergy analyzer

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use insight_core::{
    AnalysisConfig, AutomationUsage, EntityId, EntityMeta, EntityRole, Pattern, PatternType,
    SynergyOpportunity, SynergyType,
};

/// Data-driven sensor <-> actuator compatibility matrix
///
/// Keyed by (trigger domain, action domain). Unlisted combinations fall
/// back to a coarse role prior, so adding a device class is a data
/// change.
pub struct DomainCompatibility {
    matrix: HashMap<(&'static str, &'static str), f64>,
}

impl Default for DomainCompatibility {
    fn default() -> Self {
        let mut matrix = HashMap::new();
        for (trigger, action, score) in [
            ("binary_sensor", "light", 1.0),
            ("binary_sensor", "switch", 0.9),
            ("binary_sensor", "fan", 0.7),
            ("binary_sensor", "media_player", 0.6),
            ("binary_sensor", "lock", 0.8),
            ("binary_sensor", "cover", 0.7),
            ("sensor", "climate", 0.9),
            ("sensor", "fan", 0.8),
            ("sensor", "humidifier", 0.8),
            ("sensor", "cover", 0.6),
            ("sensor", "light", 0.6),
            ("person", "light", 0.7),
            ("person", "climate", 0.6),
            ("sun", "light", 0.8),
            ("sun", "cover", 0.8),
            ("weather", "cover", 0.7),
            ("calendar", "scene", 0.6),
            ("light", "light", 0.5),
            ("light", "switch", 0.4),
            ("media_player", "light", 0.5),
        ] {
            matrix.insert((trigger, action), score);
        }
        Self { matrix }
    }
}

impl DomainCompatibility {
    pub fn score(&self, trigger: &EntityId, action: &EntityId) -> f64 {
        if let Some(score) = self
            .matrix
            .get(&(trigger.domain(), action.domain()))
            .copied()
        {
            return score;
        }
        match (trigger.role(), action.role()) {
            (EntityRole::Sensor, EntityRole::Actuator) => 0.5,
            (EntityRole::Actuator, EntityRole::Actuator) => 0.3,
            (EntityRole::Sensor, EntityRole::Sensor) => 0.1,
            _ => 0.1,
        }
    }
}

/// Outcome of the pair analysis stage
#[derive(Debug, Default)]
pub struct PairOutcome {
    /// Ranked pair synergies, capped at `top_pairs_for_chains`
    pub synergies: Vec<SynergyOpportunity>,
    /// Candidates dropped because an automation already covers them
    pub excluded_already_automated: usize,
}

/// Scores candidate device pairs and ranks them by impact
///
/// Candidates are entity pairs sharing an area plus pairs backed by a
/// confident co-occurrence pattern. The impact score blends domain
/// compatibility, joint usage, shared area and timing reliability with
/// the configured weights.
pub struct PairAnalyzer<'a> {
    config: &'a AnalysisConfig,
    compatibility: DomainCompatibility,
    created_at: DateTime<Utc>,
}

impl<'a> PairAnalyzer<'a> {
    pub fn new(config: &'a AnalysisConfig, created_at: DateTime<Utc>) -> Self {
        Self {
            config,
            compatibility: DomainCompatibility::default(),
            created_at,
        }
    }

    /// Analyze candidates and produce ranked pair synergies
    ///
    /// `allowed` is the noise-filtered entity universe; nothing outside
    /// it may participate. `usage_score` supplies the joint-usage
    /// component, typically the relationship graph's edge scorer.
    pub fn analyze(
        &self,
        entities: &[EntityMeta],
        allowed: &HashSet<EntityId>,
        patterns: &[Pattern],
        automations: &AutomationUsage,
        usage_score: impl Fn(&EntityId, &EntityId) -> f64,
    ) -> PairOutcome {
        let areas: HashMap<&EntityId, &str> = entities
            .iter()
            .filter_map(|meta| {
                meta.area_id
                    .as_deref()
                    .map(|area| (&meta.entity_id, area))
            })
            .collect();

        let pair_patterns = index_pair_patterns(patterns);
        let candidates = self.collect_candidates(entities, allowed, &pair_patterns);

        let mut outcome = PairOutcome::default();
        let mut synergies = Vec::new();

        for (trigger, action) in candidates {
            let covering = automations.covering(&trigger, &action);
            if covering.is_some() && !self.config.force_rediscovery {
                outcome.excluded_already_automated += 1;
                debug!(
                    trigger = %trigger,
                    action = %action,
                    "pair skipped: already automated"
                );
                continue;
            }

            let compatibility = self.compatibility.score(&trigger, &action);
            let usage = usage_score(&trigger, &action).clamp(0.0, 1.0);
            let same_area = match (areas.get(&trigger), areas.get(&action)) {
                (Some(a), Some(b)) if a == b => 1.0,
                _ => 0.0,
            };
            let reliability = pair_patterns
                .get(&unordered(&trigger, &action))
                .map(|pattern| self.reliability(pattern))
                .unwrap_or(0.5);

            let weights = &self.config.pair_weights;
            let impact = (weights.compatibility * compatibility
                + weights.usage * usage
                + weights.area * same_area
                + weights.reliability * reliability)
                .clamp(0.0, 1.0);

            let mut breakdown = BTreeMap::new();
            breakdown.insert("compatibility".to_string(), compatibility);
            breakdown.insert("usage".to_string(), usage);
            breakdown.insert("area".to_string(), same_area);
            breakdown.insert("reliability".to_string(), reliability);

            let mut synergy = SynergyOpportunity::new(
                SynergyType::DevicePair,
                vec![trigger, action],
                impact,
                breakdown,
                self.created_at,
            );
            if let Some(ids) = covering {
                synergy = synergy.validated_by(ids.to_vec());
            }
            synergies.push(synergy);
        }

        synergies.sort_by(|a, b| {
            b.impact_score
                .total_cmp(&a.impact_score)
                .then_with(|| a.synergy_id.cmp(&b.synergy_id))
        });
        synergies.truncate(self.config.top_pairs_for_chains);
        outcome.synergies = synergies;
        outcome
    }

    /// Candidate (trigger, action) pairs in deterministic order
    fn collect_candidates(
        &self,
        entities: &[EntityMeta],
        allowed: &HashSet<EntityId>,
        pair_patterns: &IndexMap<(EntityId, EntityId), &Pattern>,
    ) -> Vec<(EntityId, EntityId)> {
        let mut candidates: IndexMap<(EntityId, EntityId), ()> = IndexMap::new();

        // Confident co-occurrence pairs keep their observed direction.
        for pattern in pair_patterns.values() {
            if pattern.confidence < self.config.min_confidence {
                continue;
            }
            let (trigger, action) = (&pattern.participants[0], &pattern.participants[1]);
            if allowed.contains(trigger) && allowed.contains(action) {
                candidates.insert((trigger.clone(), action.clone()), ());
            }
        }

        // Entities sharing an area, oriented sensor -> actuator.
        let mut by_area: IndexMap<&str, Vec<&EntityId>> = IndexMap::new();
        for meta in entities {
            if !allowed.contains(&meta.entity_id) {
                continue;
            }
            if let Some(area) = meta.area_id.as_deref() {
                by_area.entry(area).or_default().push(&meta.entity_id);
            }
        }
        for (_, members) in by_area {
            for (i, a) in members.iter().enumerate() {
                for b in &members[i + 1..] {
                    let (trigger, action) = orient(a, b);
                    if !candidates.contains_key(&(action.clone(), trigger.clone())) {
                        candidates.insert((trigger, action), ());
                    }
                }
            }
        }

        candidates.into_keys().collect()
    }

    /// Timing reliability: tight deltas score high, absent stats are
    /// neutral
    fn reliability(&self, pattern: &Pattern) -> f64 {
        match &pattern.variance_stats {
            Some(stats) => {
                (1.0 - stats.std_offset_minutes / self.config.max_variance_minutes).clamp(0.0, 1.0)
            }
            None => 0.5,
        }
    }
}

fn unordered(a: &EntityId, b: &EntityId) -> (EntityId, EntityId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// Orient a pair trigger-first: sensors trigger actuators; ties fall back
/// to lexicographic order
fn orient(a: &EntityId, b: &EntityId) -> (EntityId, EntityId) {
    match (a.role(), b.role()) {
        (EntityRole::Sensor, _) => (a.clone(), b.clone()),
        (_, EntityRole::Sensor) => (b.clone(), a.clone()),
        _ => {
            if a <= b {
                (a.clone(), b.clone())
            } else {
                (b.clone(), a.clone())
            }
        }
    }
}

/// Index co-occurrence patterns by their unordered participant pair
fn index_pair_patterns(patterns: &[Pattern]) -> IndexMap<(EntityId, EntityId), &Pattern> {
    let mut index = IndexMap::new();
    for pattern in patterns {
        if pattern.pattern_type == PatternType::CoOccurrence && pattern.participants.len() == 2 {
            index.insert(
                unordered(&pattern.participants[0], &pattern.participants[1]),
                pattern,
            );
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_core::VarianceStats;

    fn entity(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    fn meta(entity_id: &str, area: Option<&str>) -> EntityMeta {
        EntityMeta {
            entity_id: entity(entity_id),
            area_id: area.map(String::from),
            device_id: None,
            friendly_name: None,
        }
    }

    fn co_pattern(trigger: &str, target: &str, confidence: f64, support: u32) -> Pattern {
        Pattern::new(
            PatternType::CoOccurrence,
            vec![entity(trigger), entity(target)],
            confidence,
            support,
            Some(VarianceStats {
                mean_offset_minutes: 1.5,
                std_offset_minutes: 1.0,
            }),
            serde_json::Map::new(),
            Utc::now(),
            "1",
        )
    }

    fn kitchen() -> (Vec<EntityMeta>, HashSet<EntityId>) {
        let entities = vec![
            meta("binary_sensor.kitchen_motion", Some("kitchen")),
            meta("light.kitchen", Some("kitchen")),
        ];
        let allowed = entities.iter().map(|m| m.entity_id.clone()).collect();
        (entities, allowed)
    }

    #[test]
    fn test_shared_area_pair_scored() {
        let config = AnalysisConfig::default();
        let analyzer = PairAnalyzer::new(&config, Utc::now());
        let (entities, allowed) = kitchen();

        let outcome = analyzer.analyze(
            &entities,
            &allowed,
            &[],
            &AutomationUsage::new(),
            |_, _| 0.0,
        );

        assert_eq!(outcome.synergies.len(), 1);
        let pair = &outcome.synergies[0];
        assert_eq!(pair.synergy_type, SynergyType::DevicePair);
        assert!(pair.impact_score > 0.0);
        assert!(!pair.validated_by_automation);
        // Sensor oriented as trigger.
        assert_eq!(pair.participants[0].as_str(), "binary_sensor.kitchen_motion");
        assert_eq!(pair.participants[1].as_str(), "light.kitchen");
    }

    #[test]
    fn test_already_automated_pair_excluded() {
        let config = AnalysisConfig::default();
        let analyzer = PairAnalyzer::new(&config, Utc::now());
        let (entities, allowed) = kitchen();

        let mut automations = AutomationUsage::new();
        automations.insert(
            entity("binary_sensor.kitchen_motion"),
            entity("light.kitchen"),
            Some("automation.kitchen_motion_light".to_string()),
        );

        let outcome = analyzer.analyze(&entities, &allowed, &[], &automations, |_, _| 0.0);
        assert!(outcome.synergies.is_empty());
        assert_eq!(outcome.excluded_already_automated, 1);
    }

    #[test]
    fn test_force_rediscovery_marks_validated() {
        let mut config = AnalysisConfig::default();
        config.force_rediscovery = true;
        let analyzer = PairAnalyzer::new(&config, Utc::now());
        let (entities, allowed) = kitchen();

        let mut automations = AutomationUsage::new();
        automations.insert(
            entity("binary_sensor.kitchen_motion"),
            entity("light.kitchen"),
            Some("automation.kitchen_motion_light".to_string()),
        );

        let outcome = analyzer.analyze(&entities, &allowed, &[], &automations, |_, _| 0.0);
        assert_eq!(outcome.synergies.len(), 1);
        let pair = &outcome.synergies[0];
        assert!(pair.validated_by_automation);
        assert_eq!(
            pair.automation_ids,
            vec!["automation.kitchen_motion_light".to_string()]
        );
    }

    #[test]
    fn test_confident_pattern_creates_candidate_across_areas() {
        let config = AnalysisConfig::default();
        let analyzer = PairAnalyzer::new(&config, Utc::now());
        let entities = vec![
            meta("binary_sensor.front_door", Some("entry")),
            meta("light.hallway", Some("hallway")),
        ];
        let allowed: HashSet<EntityId> = entities.iter().map(|m| m.entity_id.clone()).collect();
        let patterns = vec![co_pattern("binary_sensor.front_door", "light.hallway", 0.9, 12)];

        let outcome = analyzer.analyze(
            &entities,
            &allowed,
            &patterns,
            &AutomationUsage::new(),
            |_, _| 0.8,
        );

        assert_eq!(outcome.synergies.len(), 1);
        let pair = &outcome.synergies[0];
        assert_eq!(pair.participants[0].as_str(), "binary_sensor.front_door");
        assert!(pair.score_breakdown["usage"] > 0.0);
        // Different areas: no area bonus.
        assert_eq!(pair.score_breakdown["area"], 0.0);
    }

    #[test]
    fn test_low_confidence_pattern_not_a_candidate() {
        let config = AnalysisConfig::default();
        let analyzer = PairAnalyzer::new(&config, Utc::now());
        let entities = vec![
            meta("binary_sensor.front_door", Some("entry")),
            meta("light.hallway", Some("hallway")),
        ];
        let allowed: HashSet<EntityId> = entities.iter().map(|m| m.entity_id.clone()).collect();
        let patterns = vec![co_pattern("binary_sensor.front_door", "light.hallway", 0.2, 6)];

        let outcome = analyzer.analyze(
            &entities,
            &allowed,
            &patterns,
            &AutomationUsage::new(),
            |_, _| 0.0,
        );
        assert!(outcome.synergies.is_empty());
    }

    #[test]
    fn test_ranked_and_capped() {
        let mut config = AnalysisConfig::default();
        config.top_pairs_for_chains = 1;
        let analyzer = PairAnalyzer::new(&config, Utc::now());
        let entities = vec![
            meta("binary_sensor.kitchen_motion", Some("kitchen")),
            meta("light.kitchen", Some("kitchen")),
            meta("switch.kettle", Some("kitchen")),
        ];
        let allowed: HashSet<EntityId> = entities.iter().map(|m| m.entity_id.clone()).collect();

        let outcome = analyzer.analyze(
            &entities,
            &allowed,
            &[],
            &AutomationUsage::new(),
            |_, _| 0.0,
        );

        assert_eq!(outcome.synergies.len(), 1);
        // The motion -> light pair outranks motion -> kettle and
        // light <-> kettle.
        assert_eq!(outcome.synergies[0].participants[1].as_str(), "light.kitchen");
    }

    #[test]
    fn test_noise_entities_never_candidates() {
        let config = AnalysisConfig::default();
        let analyzer = PairAnalyzer::new(&config, Utc::now());
        let entities = vec![
            meta("binary_sensor.kitchen_motion", Some("kitchen")),
            meta("light.kitchen", Some("kitchen")),
            meta("sensor.kitchen_motion_battery", Some("kitchen")),
        ];
        // The battery sensor is outside the allowed universe.
        let allowed: HashSet<EntityId> = entities[..2]
            .iter()
            .map(|m| m.entity_id.clone())
            .collect();

        let outcome = analyzer.analyze(
            &entities,
            &allowed,
            &[],
            &AutomationUsage::new(),
            |_, _| 0.0,
        );

        assert_eq!(outcome.synergies.len(), 1);
        for synergy in &outcome.synergies {
            for participant in &synergy.participants {
                assert!(!participant.as_str().contains("_battery"));
            }
        }
    }
}
