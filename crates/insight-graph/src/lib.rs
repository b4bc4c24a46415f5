//! Relationship graph over entities, with a pluggable edge scorer
//!
//! The graph is ephemeral: rebuilt from each run's snapshot and patterns,
//! owned exclusively by its builder for the run's lifetime. Scoring is a
//! capability seam: the default scorer reads the heuristic edge weight,
//! and a learned model (possibly an out-of-process inference call) can be
//! injected behind the same trait without touching graph construction.

use chrono::Timelike;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use insight_core::{EntityId, EventSnapshot, Pattern, PatternType};

/// Per-entity feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFeatures {
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
    /// Total state changes in the snapshot
    pub usage_count: u32,
    /// Busiest hour of day, if the entity had any activity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_hour: Option<u32>,
}

/// Per-edge features derived from co-occurrence patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeFeatures {
    /// Normalized confidence x support weight in [0, 1]
    pub weight: f64,
    pub confidence: f64,
    pub support: u32,
    /// Mean trigger-to-target delay, when the pattern recorded one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_offset_minutes: Option<f64>,
}

/// Entity relationship graph for one analysis run
#[derive(Debug, Default)]
pub struct RelationshipGraph {
    nodes: IndexMap<EntityId, NodeFeatures>,
    /// Keyed by the unordered pair in sorted order
    edges: IndexMap<(EntityId, EntityId), EdgeFeatures>,
}

impl RelationshipGraph {
    /// Build the graph from a snapshot and the run's aggregated patterns
    ///
    /// Nodes come from the (already noise-filtered) snapshot; edges from
    /// co-occurrence patterns, with weight = confidence x support
    /// normalized by the strongest pair observed this run.
    pub fn build(snapshot: &EventSnapshot, patterns: &[Pattern]) -> Self {
        let mut nodes: IndexMap<EntityId, NodeFeatures> = IndexMap::new();
        let mut hour_histograms: IndexMap<EntityId, [u32; 24]> = IndexMap::new();

        for event in snapshot.events() {
            let entry = nodes
                .entry(event.entity_id.clone())
                .or_insert_with(|| NodeFeatures {
                    domain: event.entity_id.domain().to_string(),
                    area_id: event.area_id.clone(),
                    usage_count: 0,
                    peak_hour: None,
                });
            entry.usage_count += 1;
            if entry.area_id.is_none() {
                entry.area_id = event.area_id.clone();
            }
            hour_histograms.entry(event.entity_id.clone()).or_insert([0; 24])
                [event.timestamp.hour() as usize] += 1;
        }
        for (entity, histogram) in hour_histograms {
            if let Some(node) = nodes.get_mut(&entity) {
                node.peak_hour = histogram
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(&a.0)))
                    .map(|(hour, _)| hour as u32);
            }
        }

        let co_occurrence: Vec<&Pattern> = patterns
            .iter()
            .filter(|p| p.pattern_type == PatternType::CoOccurrence && p.participants.len() == 2)
            .collect();
        let max_strength = co_occurrence
            .iter()
            .map(|p| p.confidence * p.support as f64)
            .fold(0.0_f64, f64::max);

        let mut edges = IndexMap::new();
        for pattern in co_occurrence {
            let (a, b) = (&pattern.participants[0], &pattern.participants[1]);
            let key = if a <= b {
                (a.clone(), b.clone())
            } else {
                (b.clone(), a.clone())
            };
            let strength = pattern.confidence * pattern.support as f64;
            let weight = if max_strength > 0.0 {
                strength / max_strength
            } else {
                0.0
            };
            edges.insert(
                key,
                EdgeFeatures {
                    weight,
                    confidence: pattern.confidence,
                    support: pattern.support,
                    mean_offset_minutes: pattern
                        .variance_stats
                        .map(|stats| stats.mean_offset_minutes),
                },
            );
        }

        Self { nodes, edges }
    }

    pub fn node(&self, entity: &EntityId) -> Option<&NodeFeatures> {
        self.nodes.get(entity)
    }

    pub fn edge(&self, a: &EntityId, b: &EntityId) -> Option<&EdgeFeatures> {
        let key = if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };
        self.edges.get(&key)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Neighbors of an entity with their edge features, in deterministic
    /// insertion order
    pub fn neighbors<'a>(
        &'a self,
        entity: &'a EntityId,
    ) -> impl Iterator<Item = (&'a EntityId, &'a EdgeFeatures)> {
        self.edges.iter().filter_map(move |((a, b), features)| {
            if a == entity {
                Some((b, features))
            } else if b == entity {
                Some((a, features))
            } else {
                None
            }
        })
    }
}

/// Capability seam for edge scoring
///
/// Implementations must be pure functions of the graph so runs stay
/// deterministic.
pub trait EdgeScorer: Send + Sync {
    fn score(&self, graph: &RelationshipGraph, a: &EntityId, b: &EntityId) -> f64;
}

/// Default scorer: the heuristic edge weight, with a weak structural
/// prior for pairs that never co-occurred
pub struct HeuristicEdgeScorer;

impl EdgeScorer for HeuristicEdgeScorer {
    fn score(&self, graph: &RelationshipGraph, a: &EntityId, b: &EntityId) -> f64 {
        if let Some(edge) = graph.edge(a, b) {
            return edge.weight;
        }
        let (Some(node_a), Some(node_b)) = (graph.node(a), graph.node(b)) else {
            return 0.0;
        };
        let mut prior = 0.0;
        if node_a.area_id.is_some() && node_a.area_id == node_b.area_id {
            prior += 0.2;
        }
        if node_a.domain == node_b.domain {
            prior += 0.1;
        }
        prior
    }
}
