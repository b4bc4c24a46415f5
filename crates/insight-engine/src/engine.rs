//! The batch analysis pass

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use ulid::Ulid;

use insight_core::{
    AnalysisConfig, AutomationUsage, ContextObservation, ContextSignal, ContextSnapshot, EntityId,
    EntityMeta, EventSnapshot, Pattern, PatternType, SynergyOpportunity,
};
use insight_detectors::{build_detectors, DetectorError, NoiseFilter, PatternAggregator};
use insight_feedback::FeedbackAdjuster;
use insight_graph::{EdgeScorer, HeuristicEdgeScorer, RelationshipGraph};
use insight_synergy::{detect_chains, ContextAugmenter, ContextSignals, PairAnalyzer};

use crate::cache::ContextCache;
use crate::error::{EngineError, EngineResult};
use crate::providers::{
    AutomationRegistry, ContextProvider, EventStore, InsightSink, MetadataStore,
};

/// Upper bound on historical context samples per signal when building
/// observations for the contextual detector.
const MAX_CONTEXT_SAMPLES: i64 = 120;

/// Coarsest sampling step for historical context, hours.
const CONTEXT_SAMPLE_HOURS: i64 = 6;

/// Usage count at which the behavior component saturates.
const BEHAVIOR_USAGE_SATURATION: f64 = 50.0;

/// Half-open time range for an analysis pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The trailing `days` ending at `end`
    pub fn last_days(end: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: end - Duration::days(days),
            end,
        }
    }
}

/// Summary of one completed analysis pass
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub event_count: usize,
    /// Events removed by the noise filter
    pub noise_filtered: usize,
    pub pattern_count: usize,
    pub invariant_rejected: usize,
    pub duplicates_dropped: usize,
    pub failed_detectors: Vec<String>,
    /// Detectors skipped after exceeding their soft wall-clock budget
    pub timed_out_detectors: Vec<String>,
    pub pair_count: usize,
    pub chain_count: usize,
    pub synergy_count: usize,
    pub excluded_already_automated: usize,
}

/// Releases the single-in-flight flag when the pass ends, even on error.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> EngineResult<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| EngineError::RunInFlight)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Orchestrates one batch pass: fetch -> filter -> detect (concurrent) ->
/// aggregate -> pairs -> chains -> augment -> adjust -> hand off
pub struct AnalysisEngine {
    config: Arc<AnalysisConfig>,
    noise: NoiseFilter,
    event_store: Arc<dyn EventStore>,
    metadata_store: Arc<dyn MetadataStore>,
    automation_registry: Arc<dyn AutomationRegistry>,
    sink: Arc<dyn InsightSink>,
    context_provider: Option<Arc<dyn ContextProvider>>,
    edge_scorer: Arc<dyn EdgeScorer>,
    feedback: Arc<FeedbackAdjuster>,
    context_cache: Arc<ContextCache>,
    in_flight: AtomicBool,
}

impl AnalysisEngine {
    /// Build an engine, validating the config fail-fast
    pub fn new(
        config: AnalysisConfig,
        event_store: Arc<dyn EventStore>,
        metadata_store: Arc<dyn MetadataStore>,
        automation_registry: Arc<dyn AutomationRegistry>,
        sink: Arc<dyn InsightSink>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let noise = NoiseFilter::from_rules(&config.noise_exclusions)?;
        let feedback = Arc::new(FeedbackAdjuster::new(config.feedback_prior_strength));
        Ok(Self {
            config: Arc::new(config),
            noise,
            event_store,
            metadata_store,
            automation_registry,
            sink,
            context_provider: None,
            edge_scorer: Arc::new(HeuristicEdgeScorer),
            feedback,
            context_cache: Arc::new(ContextCache::default()),
            in_flight: AtomicBool::new(false),
        })
    }

    /// Attach a weather/energy/calendar enrichment source
    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context_provider = Some(provider);
        self
    }

    /// Replace the heuristic edge scorer with a learned one
    pub fn with_edge_scorer(mut self, scorer: Arc<dyn EdgeScorer>) -> Self {
        self.edge_scorer = scorer;
        self
    }

    /// Share a host-owned feedback adjuster across engines/runs
    pub fn with_feedback(mut self, feedback: Arc<FeedbackAdjuster>) -> Self {
        self.feedback = feedback;
        self
    }

    /// Share a host-owned context cache across engines/runs
    pub fn with_context_cache(mut self, cache: Arc<ContextCache>) -> Self {
        self.context_cache = cache;
        self
    }

    /// The feedback adjuster consuming `record_feedback` events
    pub fn feedback(&self) -> &Arc<FeedbackAdjuster> {
        &self.feedback
    }

    /// Execute one analysis pass over the given range
    ///
    /// Fatal errors abort before anything reaches the sink; a second call
    /// while a pass is in flight fails with `RunInFlight`.
    #[instrument(skip(self), fields(run_id))]
    pub async fn run(&self, range: TimeRange) -> EngineResult<AnalysisReport> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;

        let run_id = Ulid::new().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());
        let started_at = Utc::now();
        let wall_clock = std::time::Instant::now();

        // Required inputs: events and entity metadata are fatal when
        // missing; nothing is persisted on abort.
        let events = self
            .event_store
            .fetch_events(range)
            .await
            .map_err(|e| EngineError::InputUnavailable {
                collaborator: "event store",
                reason: e.to_string(),
            })?;
        if events.is_empty() {
            return Err(EngineError::InputUnavailable {
                collaborator: "event store",
                reason: "no events in range".to_string(),
            });
        }
        let entities = self
            .metadata_store
            .fetch_entities()
            .await
            .map_err(|e| EngineError::InputUnavailable {
                collaborator: "entity registry",
                reason: e.to_string(),
            })?;
        if entities.is_empty() {
            return Err(EngineError::InputUnavailable {
                collaborator: "entity registry",
                reason: "no entities registered".to_string(),
            });
        }
        let entities = self.enrich_entity_areas(entities).await;

        let automations = match self.automation_registry.fetch_automation_entity_usage().await {
            Ok(usage) => usage,
            Err(error) => {
                warn!(%error, "automation registry unavailable; exclusion disabled this pass");
                AutomationUsage::new()
            }
        };

        let snapshot = EventSnapshot::new(events);
        let event_count = snapshot.len();
        let (filtered, noise_filtered) = self.noise.filter(&snapshot);

        // Non-noise entity universe: registry plus anything the recorder
        // saw, so invariant checks recognize every legitimate participant.
        let mut allowed: HashSet<EntityId> = entities
            .iter()
            .map(|meta| meta.entity_id.clone())
            .filter(|id| !self.noise.is_noise(id))
            .collect();
        allowed.extend(filtered.entities());

        // Detector fan-out over the shared snapshot.
        let observations = self.collect_context_observations(range).await;
        let (results, timed_out) = self
            .run_detectors(&filtered, &observations, started_at)
            .await;

        let aggregator = PatternAggregator::new(&self.config, &allowed);
        let outcome = aggregator.aggregate(results);
        info!(
            patterns = outcome.patterns.len(),
            rejected = outcome.invariant_rejected,
            duplicates = outcome.duplicates_dropped,
            "patterns aggregated"
        );

        // Relationship graph feeds joint-usage scoring through the
        // injectable edge scorer.
        let graph = RelationshipGraph::build(&filtered, &outcome.patterns);
        let scorer = Arc::clone(&self.edge_scorer);

        let analyzer = PairAnalyzer::new(&self.config, started_at);
        let pair_outcome = analyzer.analyze(
            &entities,
            &allowed,
            &outcome.patterns,
            &automations,
            |a, b| scorer.score(&graph, a, b),
        );
        let pair_count = pair_outcome.synergies.len();

        let chains = detect_chains(&pair_outcome.synergies, &self.config, started_at);
        let chain_count = chains.len();

        // Context augmentation: embarrassingly parallel per synergy,
        // degrades to passthrough when sources are down.
        let signals = self.fetch_context_signals(range.end).await;
        let temporal_index = temporal_scores(&outcome.patterns);
        let augmenter = ContextAugmenter::new(self.config.context_blend);

        let mut synergies: Vec<SynergyOpportunity> = pair_outcome.synergies;
        synergies.extend(chains);
        let mut synergies: Vec<SynergyOpportunity> =
            futures::future::join_all(synergies.iter().map(|synergy| {
                let signals = &signals;
                let augmenter = &augmenter;
                let temporal = temporal_for(synergy, &temporal_index);
                let behavior = self.behavior_for(synergy);
                async move { augmenter.augment(synergy, signals, temporal, behavior) }
            }))
            .await;

        // Feedback-adjusted view: a new score, not an edit of history.
        for synergy in &mut synergies {
            let adjusted = self.feedback.adjusted_score(synergy);
            if (adjusted - synergy.impact_score).abs() > f64::EPSILON {
                synergy
                    .score_breakdown
                    .insert("feedback_blend".to_string(), adjusted);
                synergy.impact_score = adjusted;
            }
        }
        synergies.sort_by(|a, b| {
            b.impact_score
                .total_cmp(&a.impact_score)
                .then_with(|| a.synergy_id.cmp(&b.synergy_id))
        });

        // Single handoff; the sink owns commit atomicity.
        self.sink
            .store_patterns(&outcome.patterns)
            .await
            .map_err(EngineError::Sink)?;
        self.sink
            .store_synergies(&synergies)
            .await
            .map_err(EngineError::Sink)?;

        let report = AnalysisReport {
            run_id,
            started_at,
            duration_ms: wall_clock.elapsed().as_millis() as u64,
            event_count,
            noise_filtered,
            pattern_count: outcome.patterns.len(),
            invariant_rejected: outcome.invariant_rejected,
            duplicates_dropped: outcome.duplicates_dropped,
            failed_detectors: outcome
                .failed_detectors
                .iter()
                .map(|name| name.to_string())
                .collect(),
            timed_out_detectors: timed_out,
            pair_count,
            chain_count,
            synergy_count: synergies.len(),
            excluded_already_automated: pair_outcome.excluded_already_automated,
        };
        info!(
            patterns = report.pattern_count,
            synergies = report.synergy_count,
            duration_ms = report.duration_ms,
            "analysis pass complete"
        );
        Ok(report)
    }

    /// Run every enabled detector as its own task with a soft wall-clock
    /// budget; a timed-out detector is skipped, not awaited
    async fn run_detectors(
        &self,
        snapshot: &EventSnapshot,
        observations: &[ContextObservation],
        started_at: DateTime<Utc>,
    ) -> (
        Vec<(&'static str, Result<Vec<Pattern>, DetectorError>)>,
        Vec<String>,
    ) {
        let detectors = build_detectors(&self.config, observations, started_at);
        let budget = std::time::Duration::from_secs(self.config.detector_timeout_secs);

        let mut handles = Vec::with_capacity(detectors.len());
        for detector in detectors {
            let name = detector.name();
            let snapshot = snapshot.clone();
            let config = Arc::clone(&self.config);
            let handle =
                tokio::task::spawn_blocking(move || detector.detect(&snapshot, &config));
            handles.push((name, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        let mut timed_out = Vec::new();
        for (name, handle) in handles {
            match tokio::time::timeout(budget, handle).await {
                Ok(Ok(result)) => results.push((name, result)),
                Ok(Err(join_error)) => {
                    // A panicking detector is isolated like any failure.
                    results.push((
                        name,
                        Err(DetectorError::Failed {
                            detector: name,
                            reason: join_error.to_string(),
                        }),
                    ));
                }
                Err(_) => {
                    warn!(detector = name, budget_secs = self.config.detector_timeout_secs,
                        "detector exceeded soft budget; skipping");
                    timed_out.push(name.to_string());
                }
            }
        }
        (results, timed_out)
    }

    /// Fill missing entity areas from their device's area
    async fn enrich_entity_areas(&self, mut entities: Vec<EntityMeta>) -> Vec<EntityMeta> {
        let devices = match self.metadata_store.fetch_devices().await {
            Ok(devices) => devices,
            Err(error) => {
                warn!(%error, "device registry unavailable; entity areas not enriched");
                return entities;
            }
        };
        let device_areas: HashMap<&str, &str> = devices
            .iter()
            .filter_map(|d| d.area_id.as_deref().map(|area| (d.device_id.as_str(), area)))
            .collect();
        for meta in &mut entities {
            if meta.area_id.is_none() {
                if let Some(device_id) = meta.device_id.as_deref() {
                    meta.area_id = device_areas.get(device_id).map(|area| area.to_string());
                }
            }
        }
        entities
    }

    /// Current snapshots for the augmenter, via the long-lived cache
    async fn fetch_context_signals(&self, at: DateTime<Utc>) -> ContextSignals {
        let Some(provider) = &self.context_provider else {
            return ContextSignals::none();
        };
        let mut signals = ContextSignals::none();
        for signal in [
            ContextSignal::Weather,
            ContextSignal::Energy,
            ContextSignal::Calendar,
        ] {
            let snapshot = match self.context_cache.get(signal) {
                Some(snapshot) => Some(snapshot),
                None => match provider.fetch_context(signal, at).await {
                    Ok(snapshot) => {
                        self.context_cache.put(snapshot.clone());
                        Some(snapshot)
                    }
                    Err(error) => {
                        // ContextUnavailable: neutral, never fatal.
                        debug!(signal = signal.as_str(), %error, "context unavailable");
                        None
                    }
                },
            };
            match signal {
                ContextSignal::Weather => signals.weather = snapshot,
                ContextSignal::Energy => signals.energy = snapshot,
                ContextSignal::Calendar => signals.calendar = snapshot,
            }
        }
        signals
    }

    /// Sample historical context across the range for the contextual
    /// detector; silently empty when the provider is absent or down
    async fn collect_context_observations(&self, range: TimeRange) -> Vec<ContextObservation> {
        let Some(provider) = &self.context_provider else {
            return Vec::new();
        };
        let span_hours = (range.end - range.start).num_hours().max(1);
        let step_hours = (span_hours / MAX_CONTEXT_SAMPLES).max(CONTEXT_SAMPLE_HOURS);

        let mut observations = Vec::new();
        for signal in [
            ContextSignal::Weather,
            ContextSignal::Energy,
            ContextSignal::Calendar,
        ] {
            let mut at = range.start;
            while at < range.end {
                match provider.fetch_context(signal, at).await {
                    Ok(snapshot) => {
                        if let Some(bucket) = bucket_for(&snapshot) {
                            observations.push(ContextObservation {
                                signal,
                                bucket,
                                from: at,
                            });
                        }
                    }
                    Err(error) => {
                        debug!(signal = signal.as_str(), %error,
                            "historical context unavailable; sampling stopped for signal");
                        break;
                    }
                }
                at += Duration::hours(step_hours);
            }
        }
        observations
    }

    /// Behavior component from accumulated usage feedback
    fn behavior_for(&self, synergy: &SynergyOpportunity) -> Option<f64> {
        let stats = self.feedback.stats(&synergy.synergy_id)?;
        if stats.usage == 0 {
            return None;
        }
        Some((stats.usage as f64 / BEHAVIOR_USAGE_SATURATION).min(1.0))
    }
}

/// Entity -> time-of-day confidence, from the aggregated patterns
fn temporal_scores(patterns: &[Pattern]) -> HashMap<EntityId, f64> {
    let mut index = HashMap::new();
    for pattern in patterns {
        if pattern.pattern_type == PatternType::TimeOfDay {
            if let Some(entity) = pattern.participants.first() {
                index.insert(entity.clone(), pattern.confidence);
            }
        }
    }
    index
}

/// Mean time-of-day confidence over a synergy's participants, if any
fn temporal_for(
    synergy: &SynergyOpportunity,
    temporal_index: &HashMap<EntityId, f64>,
) -> Option<f64> {
    let scores: Vec<f64> = synergy
        .participants
        .iter()
        .filter_map(|p| temporal_index.get(p).copied())
        .collect();
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}

/// Coarse bucket label for a historical context snapshot
fn bucket_for(snapshot: &ContextSnapshot) -> Option<String> {
    match snapshot.signal {
        ContextSignal::Weather => {
            if snapshot.value("precipitation_mm").unwrap_or(0.0) > 0.1 {
                return Some("wet".to_string());
            }
            snapshot.value("temperature_c").map(|t| {
                if t < 10.0 {
                    "cold".to_string()
                } else if t > 25.0 {
                    "hot".to_string()
                } else {
                    "mild".to_string()
                }
            })
        }
        ContextSignal::Energy => {
            let level = snapshot.value("price_level").or_else(|| {
                let price = snapshot.value("price_per_kwh")?;
                let average = snapshot.value("price_avg")?;
                (average > 0.0).then(|| ((price / average - 1.0) * 1.25 + 0.5).clamp(0.0, 1.0))
            })?;
            Some(if level > 0.66 {
                "peak".to_string()
            } else if level < 0.33 {
                "offpeak".to_string()
            } else {
                "normal".to_string()
            })
        }
        ContextSignal::Calendar => snapshot.value("event_active").map(|active| {
            if active > 0.0 {
                "event".to_string()
            } else {
                "quiet".to_string()
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn weather(values: &[(&str, f64)]) -> ContextSnapshot {
        ContextSnapshot {
            signal: ContextSignal::Weather,
            observed_at: Utc::now(),
            values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn test_bucket_for_weather() {
        assert_eq!(
            bucket_for(&weather(&[("temperature_c", -3.0)])).as_deref(),
            Some("cold")
        );
        assert_eq!(
            bucket_for(&weather(&[("temperature_c", 30.0)])).as_deref(),
            Some("hot")
        );
        assert_eq!(
            bucket_for(&weather(&[("temperature_c", 18.0), ("precipitation_mm", 2.0)])).as_deref(),
            Some("wet")
        );
        assert_eq!(bucket_for(&weather(&[])), None);
    }

    #[test]
    fn test_temporal_for_averages_participants() {
        let mut index = HashMap::new();
        index.insert("light.a".parse::<EntityId>().unwrap(), 0.8);
        index.insert("light.b".parse::<EntityId>().unwrap(), 0.6);

        let synergy = SynergyOpportunity::new(
            insight_core::SynergyType::DevicePair,
            vec![
                "light.a".parse().unwrap(),
                "light.b".parse().unwrap(),
            ],
            0.5,
            BTreeMap::new(),
            Utc::now(),
        );
        let score = temporal_for(&synergy, &index).unwrap();
        assert!((score - 0.7).abs() < 1e-9);

        let unknown = SynergyOpportunity::new(
            insight_core::SynergyType::DevicePair,
            vec!["light.c".parse().unwrap(), "light.d".parse().unwrap()],
            0.5,
            BTreeMap::new(),
            Utc::now(),
        );
        assert!(temporal_for(&unknown, &index).is_none());
    }

    #[test]
    fn test_time_range_last_days() {
        let end = Utc::now();
        let range = TimeRange::last_days(end, 30);
        assert_eq!(range.end, end);
        assert_eq!((range.end - range.start).num_days(), 30);
    }
}
