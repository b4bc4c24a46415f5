//! Feedback adjuster: blends user accept/reject/usage signals into scores
//!
//! Keeps Beta-style counters per synergy and exposes an adjusted score
//! that blends the mined `impact_score` with the learned preference.
//! Accumulation is pure addition, so the result is deterministic for any
//! ordering of the same feedback events, and adjustment produces a new
//! scored view rather than mutating stored records. The adjuster is a
//! long-lived singleton owned by the host, passed by reference into runs.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use insight_core::SynergyOpportunity;

/// A single user feedback event for a synergy suggestion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub synergy_id: String,

    /// Explicit accept/reject, when the user answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,

    /// The suggestion was turned into a real automation
    #[serde(default)]
    pub deployed: bool,

    /// Times the resulting automation fired since the last report
    #[serde(default)]
    pub usage_count: u32,

    /// Star rating in [0, 5]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
}

/// Accumulated counters for one synergy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynergyStats {
    /// Positive evidence (Beta alpha), prior 1.0
    pub alpha: f64,
    /// Negative evidence (Beta beta), prior 1.0
    pub beta: f64,
    pub usage: u64,
    pub events: u64,
}

impl Default for SynergyStats {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            usage: 0,
            events: 0,
        }
    }
}

impl SynergyStats {
    /// Posterior mean of the acceptance probability
    pub fn posterior_mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Observed evidence beyond the prior
    pub fn evidence(&self) -> f64 {
        (self.alpha + self.beta - 2.0).max(0.0)
    }
}

/// Ratings at or above this count as positive evidence.
const RATING_MIDPOINT: f32 = 2.5;

/// Per-usage-report cap on positive evidence, so one chatty automation
/// cannot drown out explicit accept/reject signals.
const USAGE_EVIDENCE_CAP: f64 = 1.0;

/// Long-lived feedback score adjuster
pub struct FeedbackAdjuster {
    stats: DashMap<String, SynergyStats>,
    /// Evidence count at which feedback carries half the blended score
    prior_strength: f64,
}

impl FeedbackAdjuster {
    pub fn new(prior_strength: f64) -> Self {
        Self {
            stats: DashMap::new(),
            prior_strength: prior_strength.max(f64::EPSILON),
        }
    }

    /// Fold one feedback event into the counters
    ///
    /// Unknown synergy ids accumulate harmlessly; they simply have no
    /// effect until a matching synergy is scored. Events may arrive in
    /// any order.
    pub fn record(&self, event: &FeedbackEvent) {
        let mut entry = self.stats.entry(event.synergy_id.clone()).or_default();

        match event.accepted {
            Some(true) => entry.alpha += 1.0,
            Some(false) => entry.beta += 1.0,
            None => {}
        }
        if event.deployed {
            entry.alpha += 0.5;
        }
        if let Some(rating) = event.rating {
            let rating = rating.clamp(0.0, 5.0);
            let delta = f64::from((rating - RATING_MIDPOINT).abs()) / 2.5;
            if rating >= RATING_MIDPOINT {
                entry.alpha += delta;
            } else {
                entry.beta += delta;
            }
        }
        if event.usage_count > 0 {
            entry.usage += u64::from(event.usage_count);
            entry.alpha += (f64::from(event.usage_count) * 0.1).min(USAGE_EVIDENCE_CAP);
        }
        entry.events += 1;

        debug!(
            synergy_id = %event.synergy_id,
            alpha = entry.alpha,
            beta = entry.beta,
            "feedback recorded"
        );
    }

    /// Stats snapshot for a synergy, if any feedback was seen
    pub fn stats(&self, synergy_id: &str) -> Option<SynergyStats> {
        self.stats.get(synergy_id).map(|entry| *entry.value())
    }

    /// Blend the mined impact score with the learned preference
    ///
    /// With no feedback the score passes through unchanged; as evidence
    /// accumulates the posterior mean takes over, reaching half weight at
    /// `prior_strength` evidence.
    pub fn adjusted_score(&self, synergy: &SynergyOpportunity) -> f64 {
        let Some(stats) = self.stats(&synergy.synergy_id) else {
            return synergy.impact_score;
        };
        let evidence = stats.evidence();
        if evidence <= 0.0 {
            return synergy.impact_score;
        }
        let feedback_weight = evidence / (evidence + self.prior_strength);
        let blended = synergy.impact_score * (1.0 - feedback_weight)
            + stats.posterior_mean() * feedback_weight;
        blended.clamp(0.0, 1.0)
    }

    pub fn tracked_count(&self) -> usize {
        self.stats.len()
    }
}
