//! Prefetch module: lookups a hybrid plan needs before its predicate can be finalized.
//!
//! The engine only declares these operations. An external accessor runs them, in any
//! order, and the results are fed to a fresh `PredicateBuilder`.

use crate::expr::{FilterNode, SequenceItem, SolutionCondition};
use crate::LayerFilterError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Observed ordinal span of one solution across the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdinalRange {
    pub min: i64,
    pub max: i64,
}

impl OrdinalRange {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn include(self, ordinal: i64) -> Self {
        Self {
            min: self.min.min(ordinal),
            max: self.max.max(ordinal),
        }
    }
}

/// A declared lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PrefetchOperation {
    /// Ordinal ranges for every named solution.
    OrdinalRanges { solution_names: Vec<String> },
    /// Names of the solutions satisfying a dynamic sequence step.
    ResolveSolutions { query: SolutionCondition },
}

impl PrefetchOperation {
    /// Collects the lookups the sequence filters in `filter` can use, deduplicated.
    ///
    /// Literal steps and choice group options all name solutions. Names compare
    /// case-insensitively; the first spelling seen is kept.
    /// Dynamic queries are keyed by attribute, operator and value. Malformed dynamic
    /// queries contribute nothing.
    pub fn extract(filter: &FilterNode) -> Vec<PrefetchOperation> {
        let mut names = BTreeMap::new();
        let mut queries = Vec::new();
        let mut seen = HashSet::new();
        collect(filter, &mut names, &mut queries, &mut seen);

        let mut ops = Vec::with_capacity(queries.len() + 1);
        if !names.is_empty() {
            ops.push(PrefetchOperation::OrdinalRanges {
                solution_names: names.into_values().collect(),
            });
        }
        ops.extend(queries.into_iter().map(|query| PrefetchOperation::ResolveSolutions { query }));
        ops
    }
}

fn collect(
    node: &FilterNode,
    names: &mut BTreeMap<String, String>,
    queries: &mut Vec<SolutionCondition>,
    seen: &mut HashSet<SolutionCondition>,
) {
    if let Some(sequence) = node.sequence() {
        for item in sequence {
            match item {
                SequenceItem::Literal(name) => {
                    names.entry(name.to_lowercase()).or_insert_with(|| name.clone());
                }
                SequenceItem::ChoiceGroup(options) => {
                    for option in options {
                        names.entry(option.to_lowercase()).or_insert_with(|| option.clone());
                    }
                }
                SequenceItem::DynamicQuery(raw) => match raw.parse() {
                    Ok(query) => {
                        if seen.insert(query.key()) {
                            queries.push(query);
                        }
                    }
                    Err(e) => log::debug!("skipping malformed dynamic step in pre-fetch: {}", e),
                },
            }
        }
    }
    for child in node.children() {
        collect(child, names, queries, seen);
    }
}

/// Executes declared lookups against an external source.
pub trait PrefetchAccessor {
    fn ordinal_ranges(&self, solution_names: &[String]) -> Result<HashMap<String, OrdinalRange>, LayerFilterError>;
    fn resolve_solutions(&self, query: &SolutionCondition) -> Result<Vec<String>, LayerFilterError>;
}

/// Lookup tables produced by running pre-fetch operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrefetchResults {
    ordinal_ranges: HashMap<String, OrdinalRange>,
    resolved: HashMap<SolutionCondition, Vec<String>>,
}

impl PrefetchResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every operation. All must succeed before the predicate is rebuilt.
    pub fn collect<A: PrefetchAccessor + ?Sized>(
        operations: &[PrefetchOperation],
        accessor: &A,
    ) -> Result<PrefetchResults, LayerFilterError> {
        let mut results = PrefetchResults::new();
        for op in operations {
            match op {
                PrefetchOperation::OrdinalRanges { solution_names } => {
                    for (name, range) in accessor.ordinal_ranges(solution_names)? {
                        results.insert_range(&name, range);
                    }
                }
                PrefetchOperation::ResolveSolutions { query } => {
                    let names = accessor.resolve_solutions(query)?;
                    results.insert_resolution(query, names);
                }
            }
        }
        log::debug!(
            "pre-fetch complete: {} ordinal range(s), {} resolution(s)",
            results.ordinal_ranges.len(),
            results.resolved.len()
        );
        Ok(results)
    }

    pub fn insert_range(&mut self, solution_name: &str, range: OrdinalRange) {
        self.ordinal_ranges.insert(solution_name.to_lowercase(), range);
    }

    pub fn insert_resolution(&mut self, query: &SolutionCondition, solution_names: Vec<String>) {
        let names = solution_names.into_iter().map(|n| n.to_lowercase()).collect();
        self.resolved.insert(query.key(), names);
    }

    pub fn ordinal_range(&self, solution_name: &str) -> Option<OrdinalRange> {
        self.ordinal_ranges.get(&solution_name.to_lowercase()).copied()
    }

    /// Resolved solution names, lowercased.
    pub fn resolved_solutions(&self, query: &SolutionCondition) -> Option<&[String]> {
        self.resolved.get(&query.key()).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.ordinal_ranges.is_empty() && self.resolved.is_empty()
    }
}
