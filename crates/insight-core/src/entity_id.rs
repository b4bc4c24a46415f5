//! Entity ID type representing a domain.object_id pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid entity IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id must contain exactly one '.' separator")]
    InvalidFormat,

    #[error("domain and object_id must be non-empty")]
    EmptyPart,

    #[error("entity_id '{0}' contains invalid characters (lowercase alphanumeric and underscores only, no leading/trailing underscore)")]
    InvalidChars(String),
}

/// Coarse role of an entity in a trigger/action relationship
///
/// The pair analyzer uses roles to orient candidate pairs: sensors make
/// natural triggers, actuators make natural actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRole {
    Sensor,
    Actuator,
    Other,
}

/// Domains whose entities report state rather than act on it.
const SENSOR_DOMAINS: &[&str] = &[
    "binary_sensor",
    "sensor",
    "sun",
    "weather",
    "person",
    "calendar",
];

/// Domains whose entities perform actions.
const ACTUATOR_DOMAINS: &[&str] = &[
    "light",
    "switch",
    "fan",
    "climate",
    "cover",
    "media_player",
    "lock",
    "vacuum",
    "humidifier",
    "scene",
    "script",
    "water_heater",
];

/// A validated entity identifier, e.g. "light.living_room"
///
/// Stored as the full `domain.object_id` string with a cached separator
/// position so that `domain()`/`object_id()` are allocation-free slices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    full: String,
    sep: usize,
}

impl EntityId {
    /// Create a new EntityId from domain and object_id parts
    pub fn new(domain: &str, object_id: &str) -> Result<Self, EntityIdError> {
        Self::parse_full(&format!("{domain}.{object_id}"))
    }

    fn parse_full(s: &str) -> Result<Self, EntityIdError> {
        let mut dots = s.match_indices('.');
        let sep = match (dots.next(), dots.next()) {
            (Some((idx, _)), None) => idx,
            _ => return Err(EntityIdError::InvalidFormat),
        };
        let (domain, object_id) = (&s[..sep], &s[sep + 1..]);
        if domain.is_empty() || object_id.is_empty() {
            return Err(EntityIdError::EmptyPart);
        }
        if !is_valid_part(domain) || !is_valid_part(object_id) {
            return Err(EntityIdError::InvalidChars(s.to_string()));
        }
        Ok(Self {
            full: s.to_string(),
            sep,
        })
    }

    /// Get the domain part of the entity ID
    pub fn domain(&self) -> &str {
        &self.full[..self.sep]
    }

    /// Get the object_id part of the entity ID
    pub fn object_id(&self) -> &str {
        &self.full[self.sep + 1..]
    }

    /// Get the full `domain.object_id` string
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// Classify the entity by its domain
    pub fn role(&self) -> EntityRole {
        let domain = self.domain();
        if SENSOR_DOMAINS.contains(&domain) {
            EntityRole::Sensor
        } else if ACTUATOR_DOMAINS.contains(&domain) {
            EntityRole::Actuator
        } else {
            EntityRole::Other
        }
    }
}

/// Lowercase alphanumeric with underscores, no leading/trailing underscore.
fn is_valid_part(s: &str) -> bool {
    if s.starts_with('_') || s.ends_with('_') {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_full(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.full
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_entity_id() {
        let id: EntityId = "light.living_room".parse().unwrap();
        assert_eq!(id.domain(), "light");
        assert_eq!(id.object_id(), "living_room");
        assert_eq!(id.to_string(), "light.living_room");
    }

    #[test]
    fn test_invalid_format() {
        assert_eq!(
            "no_separator".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidFormat
        );
        assert_eq!(
            "too.many.parts".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidFormat
        );
    }

    #[test]
    fn test_empty_parts() {
        assert_eq!(
            ".object".parse::<EntityId>().unwrap_err(),
            EntityIdError::EmptyPart
        );
        assert_eq!(
            "domain.".parse::<EntityId>().unwrap_err(),
            EntityIdError::EmptyPart
        );
    }

    #[test]
    fn test_invalid_chars() {
        assert!(matches!(
            "UPPER.case".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidChars(_)
        ));
        assert!(matches!(
            "light._room".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidChars(_)
        ));
        assert!("my_light.living_room".parse::<EntityId>().is_ok());
    }

    #[test]
    fn test_roles() {
        let motion: EntityId = "binary_sensor.kitchen_motion".parse().unwrap();
        let light: EntityId = "light.kitchen".parse().unwrap();
        let zone: EntityId = "zone.home".parse().unwrap();
        assert_eq!(motion.role(), EntityRole::Sensor);
        assert_eq!(light.role(), EntityRole::Actuator);
        assert_eq!(zone.role(), EntityRole::Other);
    }

    #[test]
    fn test_serde_roundtrip() {
        let id: EntityId = "switch.kitchen".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"switch.kitchen\"");
        let parsed: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let a: EntityId = "light.a".parse().unwrap();
        let b: EntityId = "light.b".parse().unwrap();
        assert!(a < b);
    }
}
