//! Plan module: decides how a filter is split between the relational store and the
//! in-memory evaluator.
//!
//! For every plan, `predicate(c) && residual(c)` equals the evaluator's verdict on the
//! full filter, with an absent residual counting as `true`.

use crate::capability::Capability;
use crate::compiler::PredicateBuilder;
use crate::config::PlannerConfig;
use crate::expr::FilterNode;
use crate::ir::Predicate;
use crate::prefetch::{PrefetchOperation, PrefetchResults};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How the work of a plan is distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanShape {
    /// The predicate alone is exact.
    Relational,
    /// The predicate narrows candidates and the residual confirms them.
    Hybrid,
    /// An AND was split: exact children pushed down, the rest kept as residual.
    Split,
    /// Nothing is pushed down.
    InMemory,
}

impl fmt::Display for PlanShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanShape::Relational => "relational",
            PlanShape::Hybrid => "hybrid",
            PlanShape::Split => "split",
            PlanShape::InMemory => "in-memory",
        };
        f.write_str(s)
    }
}

/// The outcome of planning one filter.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub capability: Capability,
    pub shape: PlanShape,
    /// Predicate to hand to the store. Built without pre-fetch data.
    pub predicate: Predicate,
    /// The sub-filter `predicate` was compiled from, if any.
    pub pushdown: Option<FilterNode>,
    /// Filter to run in memory over the rows the store returns.
    pub residual: Option<FilterNode>,
    pub prefetch: Vec<PrefetchOperation>,
    /// Diagnostic summary of the decisions taken.
    pub rationale: String,
}

impl QueryPlan {
    pub fn has_residual(&self) -> bool {
        self.residual.is_some()
    }

    pub fn needs_prefetch(&self) -> bool {
        !self.prefetch.is_empty()
    }
}

/// Builds query plans. Holds only construction-time configuration, so one planner can
/// be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct QueryPlanner {
    config: Arc<PlannerConfig>,
}

impl QueryPlanner {
    /// Accepts an owned or an already shared configuration.
    pub fn new(config: impl Into<Arc<PlannerConfig>>) -> Self {
        Self { config: config.into() }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn plan(&self, filter: Option<&FilterNode>) -> QueryPlan {
        let Some(filter) = filter else {
            return QueryPlan {
                capability: Capability::FullySqlTranslatable,
                shape: PlanShape::Relational,
                predicate: Predicate::Const(true),
                pushdown: None,
                residual: None,
                prefetch: Vec::new(),
                rationale: "no filter: every component matches".to_string(),
            };
        };

        let filter = if self.config.rank_by_selectivity {
            rank(filter)
        } else {
            filter.clone()
        };
        let capability = filter.capability();

        if self.config.force_in_memory {
            log::debug!("force_in_memory set; skipping pushdown of {} filter", filter.kind());
            return in_memory(capability, filter, "in-memory evaluation forced by configuration".to_string());
        }

        let builder = PredicateBuilder::new(&self.config.excluded_attributes);
        let plan = match capability {
            Capability::FullySqlTranslatable => QueryPlan {
                capability,
                shape: PlanShape::Relational,
                predicate: builder.build(Some(&filter)),
                pushdown: Some(filter),
                residual: None,
                prefetch: Vec::new(),
                rationale: "fully translatable: pure relational predicate".to_string(),
            },
            Capability::HybridSqlTranslatable => {
                let prefetch = PrefetchOperation::extract(&filter);
                let residual = filter.contains_sequence().then(|| filter.clone());
                let rationale = format!(
                    "hybrid: narrowing predicate with {} pre-fetch operation(s){}",
                    prefetch.len(),
                    if residual.is_some() { ", sequence order checked in memory" } else { "" }
                );
                QueryPlan {
                    capability,
                    shape: PlanShape::Hybrid,
                    predicate: builder.build(Some(&filter)),
                    pushdown: Some(filter),
                    residual,
                    prefetch,
                    rationale,
                }
            }
            Capability::InMemoryOnly => self.split(&builder, filter),
        };
        log::debug!("planned {} plan: {}", plan.shape, plan.rationale);
        plan
    }

    /// Rebuilds the plan's predicate with a fresh builder carrying the pre-fetch
    /// results. Plans without pushdown keep their always-true predicate.
    pub fn finalize_predicate(&self, plan: &QueryPlan, results: &PrefetchResults) -> Predicate {
        match &plan.pushdown {
            Some(pushdown) => PredicateBuilder::new(&self.config.excluded_attributes)
                .with_prefetch(results)
                .build(Some(pushdown)),
            None => plan.predicate.clone(),
        }
    }

    fn split(&self, builder: &PredicateBuilder<'_>, filter: FilterNode) -> QueryPlan {
        let children = match filter {
            FilterNode::And { children } => children,
            other => {
                let rationale = format!("in-memory only: {} root cannot be split", other.kind());
                return in_memory(Capability::InMemoryOnly, other, rationale);
            }
        };
        let (pushed, kept): (Vec<_>, Vec<_>) = children
            .into_iter()
            .partition(|child| child.capability() == Capability::FullySqlTranslatable);
        if pushed.is_empty() {
            return in_memory(
                Capability::InMemoryOnly,
                FilterNode::And { children: kept },
                "in-memory only: no AND child is translatable".to_string(),
            );
        }

        let rationale = format!(
            "split: {} AND child(ren) pushed down, {} evaluated in memory",
            pushed.len(),
            kept.len()
        );
        let pushdown = collapse(pushed);
        let residual = collapse(kept);
        QueryPlan {
            capability: Capability::InMemoryOnly,
            shape: PlanShape::Split,
            predicate: builder.build(Some(&pushdown)),
            pushdown: Some(pushdown),
            residual: Some(residual),
            prefetch: Vec::new(),
            rationale,
        }
    }
}

fn in_memory(capability: Capability, filter: FilterNode, rationale: String) -> QueryPlan {
    QueryPlan {
        capability,
        shape: PlanShape::InMemory,
        predicate: Predicate::Const(true),
        pushdown: None,
        residual: Some(filter),
        prefetch: Vec::new(),
        rationale,
    }
}

/// A single child stands for itself; several are rejoined under AND.
fn collapse(mut children: Vec<FilterNode>) -> FilterNode {
    if children.len() == 1 {
        children.remove(0)
    } else {
        FilterNode::And { children }
    }
}

/// Orders AND children most-selective first, at every depth. Evaluation results are
/// unaffected.
fn rank(node: &FilterNode) -> FilterNode {
    match node {
        FilterNode::And { children } => {
            let mut children: Vec<FilterNode> = children.iter().map(rank).collect();
            children.sort_by(|a, b| a.selectivity().total_cmp(&b.selectivity()));
            FilterNode::And { children }
        }
        FilterNode::Or { children } => FilterNode::Or { children: children.iter().map(rank).collect() },
        FilterNode::Not { child } => FilterNode::Not { child: child.as_deref().map(|c| Box::new(rank(c))) },
        FilterNode::LayerQuery { child } => FilterNode::LayerQuery { child: child.as_deref().map(|c| Box::new(rank(c))) },
        FilterNode::LayerAttributeQuery { solution, child } => FilterNode::LayerAttributeQuery {
            solution: solution.clone(),
            child: child.as_deref().map(|c| Box::new(rank(c))),
        },
        other => other.clone(),
    }
}
