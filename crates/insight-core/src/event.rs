//! State-change event records and the shared per-run snapshot

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::EntityId;

/// A single recorded state change, externally supplied and read-only
///
/// The domain is carried by the entity id; `area_id` is denormalized onto
/// the record so detectors do not need a metadata lookup per event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub entity_id: EntityId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,

    pub timestamp: DateTime<Utc>,

    pub state: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<String>,
}

impl StateChange {
    /// Domain of the changed entity
    pub fn domain(&self) -> &str {
        self.entity_id.domain()
    }
}

/// An immutable, time-sorted view over one run's event history
///
/// Backed by `Arc<[StateChange]>` so detector tasks share the snapshot
/// without copies or locks. Construction sorts by timestamp (entity id as
/// tiebreak) so every consumer observes the same deterministic order.
#[derive(Debug, Clone)]
pub struct EventSnapshot {
    events: Arc<[StateChange]>,
}

impl EventSnapshot {
    /// Build a snapshot from raw events, sorting into canonical order
    pub fn new(mut events: Vec<StateChange>) -> Self {
        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        Self {
            events: events.into(),
        }
    }

    /// All events in canonical (time, entity) order
    pub fn events(&self) -> &[StateChange] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Distinct entities in first-seen order
    pub fn entities(&self) -> Vec<EntityId> {
        let mut seen = IndexMap::new();
        for event in self.events.iter() {
            seen.entry(event.entity_id.clone()).or_insert(());
        }
        seen.into_keys().collect()
    }

    /// Per-entity change timestamps, each list ascending
    ///
    /// Keys appear in first-seen order, which is deterministic because the
    /// snapshot itself is canonically ordered.
    pub fn changes_by_entity(&self) -> IndexMap<EntityId, Vec<DateTime<Utc>>> {
        let mut map: IndexMap<EntityId, Vec<DateTime<Utc>>> = IndexMap::new();
        for event in self.events.iter() {
            map.entry(event.entity_id.clone())
                .or_default()
                .push(event.timestamp);
        }
        map
    }

    /// Inclusive time span covered by the snapshot, if non-empty
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }

    /// Retain only events accepted by the predicate, returning the new
    /// snapshot and the number of events removed
    pub fn retain(&self, keep: impl Fn(&StateChange) -> bool) -> (EventSnapshot, usize) {
        let kept: Vec<StateChange> = self.events.iter().filter(|e| keep(e)).cloned().collect();
        let removed = self.events.len() - kept.len();
        // Already sorted; avoid re-sorting through `new`.
        (
            EventSnapshot {
                events: kept.into(),
            },
            removed,
        )
    }
}
