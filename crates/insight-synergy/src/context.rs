//! Context-aware score augmentation

use std::collections::BTreeMap;
use tracing::debug;

use insight_core::{ContextBlendWeights, ContextSnapshot, SynergyOpportunity, SynergyType};

/// Comfortable indoor reference temperature, °C.
const COMFORT_TEMP_C: f64 = 21.0;

/// Current context snapshots available to a run
///
/// Every field is optional: a source that is down for this run simply
/// contributes nothing, and the augmenter degrades gracefully.
#[derive(Debug, Clone, Default)]
pub struct ContextSignals {
    pub weather: Option<ContextSnapshot>,
    pub energy: Option<ContextSnapshot>,
    pub calendar: Option<ContextSnapshot>,
}

impl ContextSignals {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.weather.is_none() && self.energy.is_none() && self.calendar.is_none()
    }
}

/// Reweights synergy scores with external context signals
///
/// `enhanced = base*w_base + temporal*w_temporal + weather*w_weather +
/// energy*w_energy + behavior*w_behavior`. A component whose source is
/// unavailable substitutes the base score, which makes it neutral: with
/// nothing available the input passes through bit-identical. The dominant
/// available external signal retypes the opportunity
/// (`weather_context` / `energy_context` / `event_context`).
pub struct ContextAugmenter {
    blend: ContextBlendWeights,
}

impl ContextAugmenter {
    pub fn new(blend: ContextBlendWeights) -> Self {
        Self { blend }
    }

    /// Augment one synergy; never fails
    ///
    /// `temporal` and `behavior` are derived upstream (time-of-day
    /// patterns of the participants, feedback usage) and are equally
    /// optional.
    pub fn augment(
        &self,
        synergy: &SynergyOpportunity,
        signals: &ContextSignals,
        temporal: Option<f64>,
        behavior: Option<f64>,
    ) -> SynergyOpportunity {
        let base = synergy.impact_score;
        let weather = signals.weather.as_ref().and_then(weather_component);
        let energy = signals.energy.as_ref().and_then(energy_component);
        let event = signals.calendar.as_ref().and_then(event_component);

        if weather.is_none()
            && energy.is_none()
            && event.is_none()
            && temporal.is_none()
            && behavior.is_none()
        {
            // Fully unavailable context: exact passthrough.
            return synergy.clone();
        }

        // Calendar events fill the behavior slot when no behavior signal
        // was derived upstream.
        let weather_score = weather.unwrap_or(base);
        let energy_score = energy.unwrap_or(base);
        let temporal_score = temporal.unwrap_or(base);
        let behavior_score = behavior.or(event).unwrap_or(base);

        let enhanced = (self.blend.base * base
            + self.blend.temporal * temporal_score
            + self.blend.weather * weather_score
            + self.blend.energy * energy_score
            + self.blend.behavior * behavior_score)
            .clamp(0.0, 1.0);

        let mut augmented = synergy.clone();
        augmented.impact_score = enhanced;

        let mut breakdown: BTreeMap<String, f64> = synergy.score_breakdown.clone();
        breakdown.insert("context_base".to_string(), base);
        if let Some(score) = weather {
            breakdown.insert("context_weather".to_string(), score);
        }
        if let Some(score) = energy {
            breakdown.insert("context_energy".to_string(), score);
        }
        if let Some(score) = event {
            breakdown.insert("context_event".to_string(), score);
        }
        if let Some(score) = temporal {
            breakdown.insert("context_temporal".to_string(), score);
        }
        augmented.score_breakdown = breakdown;

        // Retype by the dominant external signal, measured by weighted
        // pull away from the base score.
        let mut dominant: Option<(SynergyType, f64)> = None;
        for (synergy_type, component, weight) in [
            (SynergyType::WeatherContext, weather, self.blend.weather),
            (SynergyType::EnergyContext, energy, self.blend.energy),
            (SynergyType::EventContext, event, self.blend.behavior),
        ] {
            if let Some(score) = component {
                let pull = weight * (score - base).abs();
                if dominant.map(|(_, best)| pull > best).unwrap_or(true) {
                    dominant = Some((synergy_type, pull));
                }
            }
        }
        if let Some((synergy_type, pull)) = dominant {
            if pull > f64::EPSILON {
                debug!(
                    synergy_id = %synergy.synergy_id,
                    ?synergy_type,
                    "synergy retyped by dominant context signal"
                );
                augmented = augmented.retyped(synergy_type);
            }
        }

        augmented
    }
}

/// Map a weather snapshot to a need-for-automation score
///
/// Temperature discomfort and active precipitation both push toward 1.
fn weather_component(snapshot: &ContextSnapshot) -> Option<f64> {
    let discomfort = snapshot
        .value("temperature_c")
        .map(|t| ((t - COMFORT_TEMP_C).abs() / 15.0).clamp(0.0, 1.0));
    let precipitation = snapshot
        .value("precipitation_mm")
        .map(|mm| if mm > 0.1 { 0.8 } else { 0.2 });
    match (discomfort, precipitation) {
        (Some(d), Some(p)) => Some(d.max(p)),
        (Some(d), None) => Some(d),
        (None, Some(p)) => Some(p),
        (None, None) => None,
    }
}

/// Map an energy snapshot to a savings-opportunity score
///
/// Prefers an explicit normalized `price_level`; otherwise derives one
/// from the current price relative to the average.
fn energy_component(snapshot: &ContextSnapshot) -> Option<f64> {
    if let Some(level) = snapshot.value("price_level") {
        return Some(level.clamp(0.0, 1.0));
    }
    let price = snapshot.value("price_per_kwh")?;
    let average = snapshot.value("price_avg")?;
    if average <= 0.0 {
        return None;
    }
    // 40% above average saturates at 1; 40% below floors at 0.
    Some(((price / average - 1.0) * 1.25 + 0.5).clamp(0.0, 1.0))
}

/// Map a calendar snapshot to an activity score
fn event_component(snapshot: &ContextSnapshot) -> Option<f64> {
    if let Some(activity) = snapshot.value("activity") {
        return Some(activity.clamp(0.0, 1.0));
    }
    snapshot
        .value("event_active")
        .map(|active| if active > 0.0 { 0.8 } else { 0.2 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use insight_core::{ContextSignal, EntityId};

    fn synergy(impact: f64) -> SynergyOpportunity {
        SynergyOpportunity::new(
            SynergyType::DevicePair,
            vec![
                "sensor.outdoor_temp".parse::<EntityId>().unwrap(),
                "climate.living_room".parse::<EntityId>().unwrap(),
            ],
            impact,
            BTreeMap::new(),
            Utc::now(),
        )
    }

    fn snapshot(signal: ContextSignal, values: &[(&str, f64)]) -> ContextSnapshot {
        ContextSnapshot {
            signal,
            observed_at: Utc::now(),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    #[test]
    fn test_unavailable_context_is_exact_passthrough() {
        let augmenter = ContextAugmenter::new(ContextBlendWeights::default());
        let s = synergy(0.7);
        let augmented = augmenter.augment(&s, &ContextSignals::none(), None, None);
        assert_eq!(augmented.impact_score, s.impact_score);
        assert_eq!(augmented.synergy_type, SynergyType::DevicePair);
        assert_eq!(augmented.synergy_id, s.synergy_id);
    }

    #[test]
    fn test_cold_snap_boosts_and_retypes() {
        let augmenter = ContextAugmenter::new(ContextBlendWeights::default());
        let s = synergy(0.5);
        let signals = ContextSignals {
            weather: Some(snapshot(ContextSignal::Weather, &[("temperature_c", -6.0)])),
            ..ContextSignals::none()
        };

        let augmented = augmenter.augment(&s, &signals, None, None);
        // Discomfort component is 1.0, weighted 0.15 over a 0.5 base.
        assert!(augmented.impact_score > s.impact_score);
        assert_eq!(augmented.synergy_type, SynergyType::WeatherContext);
        assert_eq!(augmented.score_breakdown["context_weather"], 1.0);
    }

    #[test]
    fn test_energy_price_spike_retypes() {
        let augmenter = ContextAugmenter::new(ContextBlendWeights::default());
        let s = synergy(0.5);
        let signals = ContextSignals {
            energy: Some(snapshot(
                ContextSignal::Energy,
                &[("price_per_kwh", 0.70), ("price_avg", 0.30)],
            )),
            ..ContextSignals::none()
        };

        let augmented = augmenter.augment(&s, &signals, None, None);
        assert_eq!(augmented.synergy_type, SynergyType::EnergyContext);
        assert!(augmented.impact_score > s.impact_score);
    }

    #[test]
    fn test_dominant_signal_wins_retyping() {
        let augmenter = ContextAugmenter::new(ContextBlendWeights::default());
        let s = synergy(0.5);
        let signals = ContextSignals {
            // Mild weather: barely moves the score.
            weather: Some(snapshot(ContextSignal::Weather, &[("temperature_c", 22.0)])),
            // Strong price spike.
            energy: Some(snapshot(ContextSignal::Energy, &[("price_level", 1.0)])),
            calendar: None,
        };

        let augmented = augmenter.augment(&s, &signals, None, None);
        assert_eq!(augmented.synergy_type, SynergyType::EnergyContext);
    }

    #[test]
    fn test_temporal_only_keeps_type() {
        let augmenter = ContextAugmenter::new(ContextBlendWeights::default());
        let s = synergy(0.5);
        let augmented = augmenter.augment(&s, &ContextSignals::none(), Some(0.9), None);
        // Score moves but no external signal exists to retype it.
        assert!(augmented.impact_score > s.impact_score);
        assert_eq!(augmented.synergy_type, SynergyType::DevicePair);
    }

    #[test]
    fn test_calendar_event_retypes_to_event_context() {
        let augmenter = ContextAugmenter::new(ContextBlendWeights::default());
        let s = synergy(0.5);
        let signals = ContextSignals {
            calendar: Some(snapshot(ContextSignal::Calendar, &[("event_active", 1.0)])),
            ..ContextSignals::none()
        };
        let augmented = augmenter.augment(&s, &signals, None, None);
        assert_eq!(augmented.synergy_type, SynergyType::EventContext);
    }
}
