//! Run orchestration for the insight engine
//!
//! Wires the noise filter, detector family, aggregator, synergy layers,
//! relationship graph and feedback adjuster into one batch analysis pass
//! over an immutable event snapshot. External systems (event store,
//! metadata, automation registry, context enrichment, persistence) are
//! trait seams injected at construction; the engine never talks to a
//! database or network itself.

pub mod cache;
pub mod engine;
pub mod error;
pub mod providers;

pub use cache::ContextCache;
pub use engine::{AnalysisEngine, AnalysisReport, TimeRange};
pub use error::{EngineError, EngineResult};
pub use providers::{
    AutomationRegistry, ContextProvider, EventStore, InsightSink, MetadataStore, ProviderError,
    ProviderResult,
};
