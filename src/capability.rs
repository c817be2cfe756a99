//! Capability module: how much of a filter a relational store can evaluate.

use crate::expr::FilterNode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Translatability of a filter node, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// The store can evaluate the node exactly.
    FullySqlTranslatable,
    /// The store can narrow candidates, but the exact check needs pre-fetch data or an
    /// in-memory pass.
    HybridSqlTranslatable,
    /// Only the in-memory evaluator can decide the node.
    InMemoryOnly,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::FullySqlTranslatable => "fully translatable",
            Capability::HybridSqlTranslatable => "hybrid",
            Capability::InMemoryOnly => "in-memory only",
        };
        f.write_str(s)
    }
}

/// Classifies a possibly absent filter. An absent filter matches everything and is
/// trivially translatable.
pub fn classify(filter: Option<&FilterNode>) -> Capability {
    filter.map_or(Capability::FullySqlTranslatable, FilterNode::capability)
}

impl FilterNode {
    pub fn capability(&self) -> Capability {
        match self {
            FilterNode::Attribute { .. }
            | FilterNode::ComponentType { .. }
            | FilterNode::Managed { .. }
            | FilterNode::Publisher { .. }
            | FilterNode::SolutionQuery(_)
            | FilterNode::LayerAttribute { .. }
            | FilterNode::HasRelevantChanges { .. }
            | FilterNode::HasAttributeDiff(_)
            | FilterNode::Has { .. }
            | FilterNode::HasAny { .. }
            | FilterNode::HasAll { .. }
            | FilterNode::HasNone { .. } => Capability::FullySqlTranslatable,
            FilterNode::LayerQuery { child }
            | FilterNode::LayerAttributeQuery { child, .. }
            | FilterNode::Not { child } => classify(child.as_deref()),
            FilterNode::And { children } | FilterNode::Or { children } => children
                .iter()
                .map(FilterNode::capability)
                .max()
                .unwrap_or(Capability::FullySqlTranslatable),
            // Membership is relational; ordinal order is checked in memory.
            FilterNode::OrderStrict { .. } | FilterNode::OrderFlex { .. } => Capability::HybridSqlTranslatable,
            FilterNode::Unknown => {
                log::warn!("unrecognized filter kind, falling back to in-memory evaluation");
                Capability::InMemoryOnly
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{AttributeTarget, StringOperator};

    #[test]
    fn test_leaves_are_fully_translatable() {
        let leaf = FilterNode::and(vec![
            FilterNode::attribute(AttributeTarget::ComponentType, StringOperator::Equals, "Form"),
            FilterNode::HasNone { solutions: vec!["Legacy".into()] },
        ]);
        assert_eq!(leaf.capability(), Capability::FullySqlTranslatable);
    }

    #[test]
    fn test_absent_filter_is_fully_translatable() {
        assert_eq!(classify(None), Capability::FullySqlTranslatable);
        assert_eq!(FilterNode::Not { child: None }.capability(), Capability::FullySqlTranslatable);
        assert_eq!(FilterNode::and(vec![]).capability(), Capability::FullySqlTranslatable);
    }

    #[test]
    fn test_worst_case_wins() {
        let hybrid = FilterNode::order_flex(vec!["A", "B"]);
        let node = FilterNode::or(vec![FilterNode::has("X"), hybrid.clone()]);
        assert_eq!(node.capability(), Capability::HybridSqlTranslatable);
        let node = FilterNode::and(vec![hybrid, FilterNode::Unknown, FilterNode::has("X")]);
        assert_eq!(node.capability(), Capability::InMemoryOnly);
    }

    #[test]
    fn test_wrappers_inherit_child() {
        let seq = FilterNode::order_strict(vec!["A"]);
        assert_eq!(FilterNode::not(seq.clone()).capability(), Capability::HybridSqlTranslatable);
        assert_eq!(FilterNode::layer_query(seq.clone()).capability(), Capability::HybridSqlTranslatable);
        let laq = FilterNode::LayerAttributeQuery { solution: "A".into(), child: Some(Box::new(FilterNode::Unknown)) };
        assert_eq!(laq.capability(), Capability::InMemoryOnly);
        let laq = FilterNode::LayerAttributeQuery { solution: "A".into(), child: None };
        assert_eq!(laq.capability(), Capability::FullySqlTranslatable);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Capability::FullySqlTranslatable < Capability::HybridSqlTranslatable);
        assert!(Capability::HybridSqlTranslatable < Capability::InMemoryOnly);
    }
}
