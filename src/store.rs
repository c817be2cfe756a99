//! Store module: the relational query facade and an in-memory reference store.

use crate::expr::SolutionCondition;
use crate::ir::{LayerPredicate, Predicate, StringTest};
use crate::prefetch::{OrdinalRange, PrefetchAccessor};
use crate::types::Component;
use crate::LayerFilterError;
use std::collections::{BTreeMap, HashMap};

/// A store that can evaluate compiled predicates natively.
pub trait ComponentStore {
    fn query(&self, predicate: &Predicate) -> Result<Vec<Component>, LayerFilterError>;
}

/// Reference store holding components in memory and running predicates with the IR's
/// own relational semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    components: Vec<Component>,
}

impl MemoryStore {
    pub fn new(components: Vec<Component>) -> Self {
        Self {
            components: components.into_iter().map(Component::normalize).collect(),
        }
    }

    /// Loads a JSON array of components.
    pub fn from_json(input: &str) -> Result<MemoryStore, LayerFilterError> {
        let components: Vec<Component> =
            serde_json::from_str(input).map_err(|e| LayerFilterError::Store(e.to_string()))?;
        Ok(MemoryStore::new(components))
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn push(&mut self, component: Component) {
        self.components.push(component.normalize());
    }
}

impl ComponentStore for MemoryStore {
    fn query(&self, predicate: &Predicate) -> Result<Vec<Component>, LayerFilterError> {
        let rows: Vec<Component> = self.components.iter().filter(|c| predicate.matches(c)).cloned().collect();
        log::debug!("memory store returned {} of {} component(s)", rows.len(), self.components.len());
        Ok(rows)
    }
}

impl PrefetchAccessor for MemoryStore {
    fn ordinal_ranges(&self, solution_names: &[String]) -> Result<HashMap<String, OrdinalRange>, LayerFilterError> {
        let wanted: HashMap<String, &String> = solution_names.iter().map(|n| (n.to_lowercase(), n)).collect();
        let mut ranges = HashMap::new();
        for layer in self.components.iter().flat_map(Component::layers) {
            if let Some(name) = wanted.get(&layer.solution_name.to_lowercase()) {
                ranges
                    .entry((*name).clone())
                    .and_modify(|r: &mut OrdinalRange| *r = r.include(layer.ordinal))
                    .or_insert_with(|| OrdinalRange::new(layer.ordinal, layer.ordinal));
            }
        }
        Ok(ranges)
    }

    fn resolve_solutions(&self, query: &SolutionCondition) -> Result<Vec<String>, LayerFilterError> {
        let test = LayerPredicate::Solution {
            field: query.attribute,
            test: StringTest::from_operator(query.operator, &query.value),
        };
        let mut names = BTreeMap::new();
        for component in &self.components {
            for layer in component.layers() {
                if test.matches(component, layer) {
                    names
                        .entry(layer.solution_name.to_lowercase())
                        .or_insert_with(|| layer.solution_name.clone());
                }
            }
        }
        Ok(names.into_values().collect())
    }
}
