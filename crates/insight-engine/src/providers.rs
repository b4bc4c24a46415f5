//! Trait seams for external collaborators
//!
//! The engine consumes these interfaces; implementations live with the
//! host (recorder database, registry caches, weather/energy/calendar
//! clients, persistence layer). Retrying a failed upstream source is the
//! collaborator's responsibility, not the engine's.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use insight_core::{
    AutomationUsage, ContextSignal, ContextSnapshot, DeviceMeta, EntityMeta, Pattern, StateChange,
    SynergyOpportunity,
};

use crate::engine::TimeRange;

/// Errors surfaced by external collaborators
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: &'static str,
        reason: String,
    },
}

impl ProviderError {
    pub fn unavailable(collaborator: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            collaborator,
            reason: reason.into(),
        }
    }
}

/// Result type for collaborator calls
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Time-series event store (the recorder)
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn fetch_events(&self, range: TimeRange) -> ProviderResult<Vec<StateChange>>;
}

/// Entity and device metadata registries
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn fetch_entities(&self) -> ProviderResult<Vec<EntityMeta>>;

    async fn fetch_devices(&self) -> ProviderResult<Vec<DeviceMeta>>;
}

/// Registry of entity pairs already covered by automations
#[async_trait]
pub trait AutomationRegistry: Send + Sync {
    async fn fetch_automation_entity_usage(&self) -> ProviderResult<AutomationUsage>;
}

/// Weather / energy / calendar enrichment source
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn fetch_context(
        &self,
        signal: ContextSignal,
        at: DateTime<Utc>,
    ) -> ProviderResult<ContextSnapshot>;
}

/// Persistence sink; commit atomicity (all-or-nothing replace) is owned
/// by the implementation
#[async_trait]
pub trait InsightSink: Send + Sync {
    async fn store_patterns(&self, patterns: &[Pattern]) -> ProviderResult<()>;

    async fn store_synergies(&self, synergies: &[SynergyOpportunity]) -> ProviderResult<()>;
}
