//! Filter module: wraps planned filters and provides the main execution API.
//!
//! This module provides the CompiledFilter type, which runs the two-phase pipeline:
//! plan, pre-fetch, rebuild the predicate, query the store, apply the residual.

use crate::config::PlannerConfig;
use crate::evaluator::Evaluator;
use crate::expr::FilterNode;
use crate::plan::{QueryPlan, QueryPlanner};
use crate::prefetch::{PrefetchAccessor, PrefetchResults};
use crate::store::ComponentStore;
use crate::types::Component;
use crate::LayerFilterError;
use std::sync::Arc;

/// A planned filter, ready for execution.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    filter: Option<FilterNode>,
    planner: QueryPlanner,
    plan: QueryPlan,
}

impl CompiledFilter {
    /// Plan a filter under the given configuration. An absent filter matches everything.
    pub fn new(filter: Option<FilterNode>, config: Arc<PlannerConfig>) -> Self {
        let planner = QueryPlanner::new(config);
        let plan = planner.plan(filter.as_ref());
        Self { filter, planner, plan }
    }

    /// Decode a wire payload and plan it.
    pub fn from_json(input: &str, config: Arc<PlannerConfig>) -> Result<Self, LayerFilterError> {
        Ok(Self::new(Some(FilterNode::from_json(input)?), config))
    }

    pub fn filter(&self) -> Option<&FilterNode> {
        self.filter.as_ref()
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn config(&self) -> &PlannerConfig {
        self.planner.config()
    }

    /// Evaluate the whole filter in memory against one component.
    pub fn matches(&self, component: &Component) -> bool {
        Evaluator::new(&self.config().excluded_attributes).evaluate(self.filter.as_ref(), component)
    }

    /// Execute against a store that also serves pre-fetch lookups.
    pub fn execute<S>(&self, store: &S) -> Result<Vec<Component>, LayerFilterError>
    where
        S: ComponentStore + PrefetchAccessor,
    {
        self.execute_with(store, store)
    }

    /// Execute with separate store and pre-fetch accessor.
    pub fn execute_with<S, A>(&self, store: &S, accessor: &A) -> Result<Vec<Component>, LayerFilterError>
    where
        S: ComponentStore + ?Sized,
        A: PrefetchAccessor + ?Sized,
    {
        let predicate = if self.plan.needs_prefetch() {
            let results = PrefetchResults::collect(&self.plan.prefetch, accessor)?;
            self.planner.finalize_predicate(&self.plan, &results)
        } else {
            self.plan.predicate.clone()
        };
        let mut rows = store.query(&predicate)?;
        if let Some(residual) = &self.plan.residual {
            let evaluator = Evaluator::new(&self.config().excluded_attributes);
            let before = rows.len();
            rows.retain(|c| evaluator.evaluate(Some(residual), c));
            log::debug!("residual kept {} of {} row(s)", rows.len(), before);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Predicate;
    use crate::plan::PlanShape;
    use crate::store::MemoryStore;
    use crate::types::Layer;

    fn component(name: &str, layers: &[(&str, i64)]) -> Component {
        layers
            .iter()
            .fold(Component::new(name, "Form"), |c, (s, ord)| c.layer(Layer::new(*s, *ord)))
    }

    fn store() -> MemoryStore {
        MemoryStore::new(vec![
            component("ab", &[("A", 0), ("B", 1)]),
            component("acb", &[("A", 0), ("C", 1), ("B", 2)]),
            component("ba", &[("B", 0), ("A", 1)]),
        ])
    }

    fn names(rows: &[Component]) -> Vec<&str> {
        rows.iter().map(|c| c.logical_name.as_str()).collect()
    }

    #[test]
    fn test_compiled_filter_matches() {
        let filter = CompiledFilter::new(Some(FilterNode::has("A")), Arc::new(PlannerConfig::default()));
        assert!(filter.matches(&component("x", &[("A", 0), ("B", 1)])));
        assert!(!filter.matches(&component("x", &[("B", 0), ("C", 1)])));
    }

    #[test]
    fn test_config_is_shared() {
        let config = Arc::new(PlannerConfig::default().rank_by_selectivity(true));
        let filter = CompiledFilter::new(Some(FilterNode::has("A")), config.clone());
        assert_eq!(Arc::strong_count(&config), 2);
        assert!(filter.config().rank_by_selectivity);
    }

    #[test]
    fn test_execute_hybrid_strict() {
        let filter = CompiledFilter::new(
            Some(FilterNode::order_strict(vec!["A", "B"])),
            Arc::new(PlannerConfig::default()),
        );
        assert_eq!(filter.plan().shape, PlanShape::Hybrid);
        assert_eq!(names(&filter.execute(&store()).unwrap()), vec!["ab"]);
    }

    #[test]
    fn test_execute_hybrid_flex() {
        let filter = CompiledFilter::new(
            Some(FilterNode::order_flex(vec!["A", "B"])),
            Arc::new(PlannerConfig::default()),
        );
        assert_eq!(names(&filter.execute(&store()).unwrap()), vec!["ab", "acb"]);
    }

    #[test]
    fn test_execute_absent_filter() {
        let filter = CompiledFilter::new(None, Arc::new(PlannerConfig::default()));
        assert_eq!(filter.plan().predicate, Predicate::Const(true));
        assert_eq!(filter.execute(&store()).unwrap().len(), 3);
    }

    #[test]
    fn test_from_json_reports_wire_errors() {
        let config = Arc::new(PlannerConfig::default());
        assert!(matches!(CompiledFilter::from_json("{\"type\":", config.clone()), Err(LayerFilterError::Wire(_))));
        let filter = CompiledFilter::from_json(r#"{"type":"HAS","solution":"C"}"#, config).unwrap();
        assert_eq!(names(&filter.execute(&store()).unwrap()), vec!["acb"]);
    }
}
