//! Synergy analysis for the insight engine
//!
//! Turns the run's canonical patterns into ranked multi-device
//! opportunities: scored device pairs (minus anything an automation
//! already covers), transitive chains over the top-ranked pairs, and
//! context-aware score augmentation.

pub mod chains;
pub mod context;
pub mod pairs;

pub use chains::detect_chains;
pub use context::{ContextAugmenter, ContextSignals};
pub use pairs::{DomainCompatibility, PairAnalyzer, PairOutcome};
