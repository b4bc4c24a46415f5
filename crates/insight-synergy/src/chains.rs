//! Chain detector: transitive extension of top-ranked pairs

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use insight_core::{AnalysisConfig, EntityId, SynergyOpportunity, SynergyType};

/// Extend top-ranked pairs into ordered device chains
///
/// If (A,B) and (B,C) are both ranked pairs and A ≠ C, (A,B,C) is a
/// candidate chain, extended link by link while each added link's score
/// clears `chain_min_confidence x chain_decay^(len-2)` - longer chains
/// need progressively stronger standalone evidence. Chains stop at
/// `max_chain_length` and only maximal chains are emitted; impact is the
/// mean of the contributing link scores.
pub fn detect_chains(
    pairs: &[SynergyOpportunity],
    config: &AnalysisConfig,
    created_at: DateTime<Utc>,
) -> Vec<SynergyOpportunity> {
    // Directed adjacency from the pair ranking, deterministic order.
    let mut adjacency: IndexMap<&EntityId, Vec<(&EntityId, f64)>> = IndexMap::new();
    for pair in pairs {
        if pair.synergy_type != SynergyType::DevicePair || pair.participants.len() != 2 {
            continue;
        }
        adjacency
            .entry(&pair.participants[0])
            .or_default()
            .push((&pair.participants[1], pair.impact_score));
    }
    for (_, targets) in adjacency.iter_mut() {
        targets.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    }

    let mut chains: Vec<SynergyOpportunity> = Vec::new();
    let mut emitted: HashSet<Vec<EntityId>> = HashSet::new();

    for pair in pairs {
        if pair.synergy_type != SynergyType::DevicePair || pair.participants.len() != 2 {
            continue;
        }
        let mut path: Vec<&EntityId> = pair.participants.iter().collect();
        let mut link_scores = vec![pair.impact_score];
        extend(
            &adjacency,
            config,
            created_at,
            &mut path,
            &mut link_scores,
            &mut emitted,
            &mut chains,
        );
    }

    chains.sort_by(|a, b| {
        b.impact_score
            .total_cmp(&a.impact_score)
            .then_with(|| a.synergy_id.cmp(&b.synergy_id))
    });
    chains
}

/// Depth-first extension; emits the path once no further link qualifies
fn extend<'a>(
    adjacency: &IndexMap<&EntityId, Vec<(&'a EntityId, f64)>>,
    config: &AnalysisConfig,
    created_at: DateTime<Utc>,
    path: &mut Vec<&'a EntityId>,
    link_scores: &mut Vec<f64>,
    emitted: &mut HashSet<Vec<EntityId>>,
    chains: &mut Vec<SynergyOpportunity>,
) {
    let mut extended = false;

    if path.len() < config.max_chain_length {
        // Threshold for the link that would grow the chain to
        // path.len() + 1 devices.
        let threshold = (config.chain_min_confidence
            * config.chain_decay.powi(path.len() as i32 - 1))
        .min(1.0);
        let last = match path.last() {
            Some(last) => *last,
            None => return,
        };
        if let Some(targets) = adjacency.get(last) {
            for (next, score) in targets {
                if *score < threshold || path.iter().any(|p| *p == *next) {
                    continue;
                }
                path.push(next);
                link_scores.push(*score);
                extend(
                    adjacency,
                    config,
                    created_at,
                    path,
                    link_scores,
                    emitted,
                    chains,
                );
                link_scores.pop();
                path.pop();
                extended = true;
            }
        }
    }

    if !extended && path.len() >= 3 {
        let participants: Vec<EntityId> = path.iter().map(|p| (*p).clone()).collect();
        if emitted.insert(participants.clone()) {
            let impact =
                (link_scores.iter().sum::<f64>() / link_scores.len() as f64).clamp(0.0, 1.0);
            let mut breakdown = BTreeMap::new();
            for (i, score) in link_scores.iter().enumerate() {
                breakdown.insert(format!("link_{i}"), *score);
            }
            debug!(length = participants.len(), impact, "chain detected");
            chains.push(SynergyOpportunity::new(
                SynergyType::DeviceChain,
                participants,
                impact,
                breakdown,
                created_at,
            ));
        }
    }
}
