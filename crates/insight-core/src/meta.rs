//! Metadata and context records supplied by external collaborators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::EntityId;

/// Entity registry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub entity_id: EntityId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
}

/// Device registry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMeta {
    pub device_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// External context signal families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSignal {
    Weather,
    Energy,
    Calendar,
}

impl ContextSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextSignal::Weather => "weather",
            ContextSignal::Energy => "energy",
            ContextSignal::Calendar => "calendar",
        }
    }
}

/// A point-in-time snapshot from an enrichment source
///
/// `values` carries named numeric readings (temperature_c,
/// precipitation_mm, price_per_kwh, price_avg, activity, ...); consumers
/// pick the keys they understand and treat everything else as neutral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub signal: ContextSignal,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
}

impl ContextSnapshot {
    pub fn value(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }
}

/// A historical context bucket observation used by the contextual detector
///
/// Each observation states that `bucket` (e.g. "cold", "wet") was active
/// for `signal` from `from` until the next observation of the same signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextObservation {
    pub signal: ContextSignal,
    pub bucket: String,
    pub from: DateTime<Utc>,
}

/// Entity pairs already covered by existing automations
///
/// Pairs are stored unordered: an automation triggering the light from the
/// motion sensor covers the (motion, light) combination in both
/// directions. Automation ids are carried when the registry knows them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutomationUsage {
    pairs: HashMap<(EntityId, EntityId), Vec<String>>,
}

impl AutomationUsage {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: &EntityId, b: &EntityId) -> (EntityId, EntityId) {
        if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        }
    }

    /// Record that an automation links the two entities
    pub fn insert(&mut self, a: EntityId, b: EntityId, automation_id: Option<String>) {
        let entry = self.pairs.entry(Self::key(&a, &b)).or_default();
        if let Some(id) = automation_id {
            if !entry.contains(&id) {
                entry.push(id);
            }
        }
    }

    /// Automations covering the pair, if any
    pub fn covering(&self, a: &EntityId, b: &EntityId) -> Option<&[String]> {
        self.pairs.get(&Self::key(a, b)).map(|v| v.as_slice())
    }

    pub fn is_covered(&self, a: &EntityId, b: &EntityId) -> bool {
        self.pairs.contains_key(&Self::key(a, b))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
