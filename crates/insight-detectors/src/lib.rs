//! Statistical detector family for the insight engine
//!
//! One capability contract (`Detector`) over a fixed set of
//! implementations, selected by an explicit config list. Detectors are
//! pure: they read the shared immutable snapshot and return patterns, so
//! the engine can run them as independent concurrent tasks and isolate
//! any single failure.

pub mod aggregator;
pub mod contextual;
pub mod cooccurrence;
pub mod day_type;
pub mod detector;
pub mod noise;
pub mod room;
pub mod sequence;
pub mod time_of_day;

pub use aggregator::{AggregateOutcome, PatternAggregator};
pub use contextual::ContextualDetector;
pub use cooccurrence::CoOccurrenceDetector;
pub use day_type::DayTypeDetector;
pub use detector::{build_detectors, Detector, DetectorError, DetectorResult};
pub use noise::{NoiseFilter, NoiseFilterError};
pub use room::RoomBasedDetector;
pub use sequence::SequenceDetector;
pub use time_of_day::TimeOfDayDetector;
