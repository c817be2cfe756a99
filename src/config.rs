//! Config module: construction-time configuration injected into the builder, evaluator
//! and planner.

use crate::LayerFilterError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Bookkeeping fields that never count as a relevant change.
pub const DEFAULT_EXCLUDED_ATTRIBUTES: &[&str] = &[
    "createdby",
    "createdon",
    "modifiedby",
    "modifiedon",
    "modifiedonbehalfby",
    "overwritetime",
    "versionnumber",
    "solutionid",
    "supportingsolutionid",
    "componentstate",
    "componentidunique",
    "ismanaged",
    "introducedversion",
    "overriddencreatedon",
];

/// Case-insensitive set of attribute names excluded from relevance checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ExcludedAttributes {
    names: BTreeSet<String>,
}

impl ExcludedAttributes {
    pub fn new<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(|n| n.as_ref().to_lowercase()).collect(),
        }
    }

    pub fn empty() -> Self {
        Self { names: BTreeSet::new() }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_lowercase())
    }

    /// Names in lowercase, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for ExcludedAttributes {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_ATTRIBUTES.iter().copied())
    }
}

impl From<Vec<String>> for ExcludedAttributes {
    fn from(value: Vec<String>) -> Self {
        Self::new(value)
    }
}

impl From<ExcludedAttributes> for Vec<String> {
    fn from(value: ExcludedAttributes) -> Self {
        value.names.into_iter().collect()
    }
}

/// Planner configuration. Every key is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlannerConfig {
    /// Skip pushdown entirely: every plan evaluates the whole filter in memory.
    pub force_in_memory: bool,
    /// Order AND children most-selective first.
    pub rank_by_selectivity: bool,
    pub excluded_attributes: ExcludedAttributes,
}

impl PlannerConfig {
    pub fn from_json(input: &str) -> Result<PlannerConfig, LayerFilterError> {
        serde_json::from_str(input).map_err(|e| LayerFilterError::Config(e.to_string()))
    }

    pub fn force_in_memory(mut self, force: bool) -> Self {
        self.force_in_memory = force;
        self
    }

    pub fn rank_by_selectivity(mut self, rank: bool) -> Self {
        self.rank_by_selectivity = rank;
        self
    }

    pub fn excluded_attributes(mut self, excluded: ExcludedAttributes) -> Self {
        self.excluded_attributes = excluded;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_exclusions_are_case_insensitive() {
        let excluded = ExcludedAttributes::default();
        assert!(excluded.contains("ModifiedOn"));
        assert!(excluded.contains("VERSIONNUMBER"));
        assert!(!excluded.contains("formxml"));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config = PlannerConfig::from_json(r#"{"forceInMemory": true}"#).unwrap();
        assert!(config.force_in_memory);
        assert!(!config.rank_by_selectivity);
        assert_eq!(config.excluded_attributes, ExcludedAttributes::default());
    }

    #[test]
    fn test_config_overrides_exclusions() {
        let config = PlannerConfig::from_json(r#"{"excludedAttributes": ["IconPath"]}"#).unwrap();
        assert!(config.excluded_attributes.contains("iconpath"));
        assert!(!config.excluded_attributes.contains("modifiedon"));
    }

    #[test]
    fn test_config_rejects_bad_json() {
        let res = PlannerConfig::from_json(r#"{"forceInMemory": "yes"}"#);
        assert!(matches!(res, Err(LayerFilterError::Config(_))));
    }

    #[test]
    fn test_config_round_trip() {
        let config = PlannerConfig::default()
            .rank_by_selectivity(true)
            .excluded_attributes(ExcludedAttributes::new(["a", "B"]));
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(PlannerConfig::from_json(&json).unwrap(), config);
    }
}
