//! Noise filter: removes non-actionable system entities before detection

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use insight_core::{EntityId, EventSnapshot, ExclusionRule};

/// Errors from compiling exclusion rules
#[derive(Debug, Error)]
pub enum NoiseFilterError {
    #[error("invalid exclusion regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug)]
enum CompiledRule {
    Prefix(String),
    Substring(String),
    Domain(String),
    Regex(Regex),
}

impl CompiledRule {
    fn matches(&self, entity_id: &EntityId) -> bool {
        match self {
            CompiledRule::Prefix(prefix) => entity_id.as_str().starts_with(prefix.as_str()),
            CompiledRule::Substring(needle) => entity_id.as_str().contains(needle.as_str()),
            CompiledRule::Domain(domain) => entity_id.domain() == domain,
            CompiledRule::Regex(regex) => regex.is_match(entity_id.as_str()),
        }
    }
}

/// Compiled exclusion rule set
///
/// Built once per run from the config's rule list. Rules are data: adding
/// an exclusion is a config change, never a code change.
#[derive(Debug)]
pub struct NoiseFilter {
    rules: Vec<CompiledRule>,
}

impl NoiseFilter {
    /// Compile a rule list; an invalid regex is a configuration error
    pub fn from_rules(rules: &[ExclusionRule]) -> Result<Self, NoiseFilterError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            compiled.push(match rule {
                ExclusionRule::Prefix(p) => CompiledRule::Prefix(p.clone()),
                ExclusionRule::Substring(s) => CompiledRule::Substring(s.clone()),
                ExclusionRule::Domain(d) => CompiledRule::Domain(d.clone()),
                ExclusionRule::Regex(pattern) => CompiledRule::Regex(
                    Regex::new(pattern).map_err(|source| NoiseFilterError::InvalidRegex {
                        pattern: pattern.clone(),
                        source,
                    })?,
                ),
            });
        }
        Ok(Self { rules: compiled })
    }

    /// Whether the entity is excluded from mining
    pub fn is_noise(&self, entity_id: &EntityId) -> bool {
        self.rules.iter().any(|rule| rule.matches(entity_id))
    }

    /// Filter a snapshot, returning the cleaned snapshot and the number of
    /// events removed
    pub fn filter(&self, snapshot: &EventSnapshot) -> (EventSnapshot, usize) {
        let (filtered, removed) = snapshot.retain(|event| !self.is_noise(&event.entity_id));
        debug!(removed, kept = filtered.len(), "noise filter applied");
        (filtered, removed)
    }
}
