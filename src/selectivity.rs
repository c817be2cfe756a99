//! Selectivity module: coarse estimates of how much a filter narrows the candidate set.
//!
//! Scores lie in `[0, 1]`: 0 is very selective, 1 keeps everything. They are advisory
//! and only used to order work.

use crate::expr::{FilterNode, StringOperator};

fn operator_score(operator: StringOperator) -> f64 {
    match operator {
        StringOperator::Equals => 0.1,
        StringOperator::BeginsWith => 0.3,
        StringOperator::Contains | StringOperator::EndsWith => 0.4,
        StringOperator::NotEquals => 0.9,
    }
}

/// Estimates a possibly absent filter. An absent filter keeps everything.
pub fn estimate_selectivity(filter: Option<&FilterNode>) -> f64 {
    filter.map_or(1.0, FilterNode::selectivity)
}

impl FilterNode {
    pub fn selectivity(&self) -> f64 {
        match self {
            FilterNode::Attribute { operator, .. } => operator_score(*operator),
            FilterNode::ComponentType { .. } => 0.2,
            FilterNode::Managed { .. } => 0.5,
            FilterNode::Publisher { operator, .. } => operator_score(*operator).max(0.3),
            FilterNode::SolutionQuery(condition) => operator_score(condition.operator).max(0.2),
            FilterNode::LayerAttribute { .. } => 0.3,
            FilterNode::LayerAttributeQuery { child, .. } => 0.3 * estimate_selectivity(child.as_deref()),
            FilterNode::HasRelevantChanges { .. } => 0.5,
            FilterNode::HasAttributeDiff(_) => 0.4,
            FilterNode::Has { .. } => 0.3,
            FilterNode::HasAny { solutions } => (0.3 * solutions.len() as f64).min(1.0),
            FilterNode::HasAll { solutions } => 0.3f64.powi(solutions.len().min(i32::MAX as usize) as i32),
            FilterNode::HasNone { solutions } if solutions.is_empty() => 1.0,
            FilterNode::HasNone { .. } => 0.7,
            FilterNode::OrderStrict { .. } => 0.1,
            FilterNode::OrderFlex { .. } => 0.2,
            FilterNode::LayerQuery { child } => estimate_selectivity(child.as_deref()),
            FilterNode::Not { child: None } => 1.0,
            FilterNode::Not { child: Some(child) } => 1.0 - child.selectivity(),
            FilterNode::And { children } => children.iter().map(FilterNode::selectivity).product(),
            FilterNode::Or { children } => children.iter().map(FilterNode::selectivity).fold(0.0, f64::max),
            FilterNode::Unknown => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::AttributeTarget;

    #[test]
    fn test_leaf_scores() {
        let eq = FilterNode::attribute(AttributeTarget::LogicalName, StringOperator::Equals, "x");
        let contains = FilterNode::attribute(AttributeTarget::LogicalName, StringOperator::Contains, "x");
        assert_eq!(eq.selectivity(), 0.1);
        assert_eq!(contains.selectivity(), 0.4);
        assert_eq!(FilterNode::HasNone { solutions: vec!["Legacy".into()] }.selectivity(), 0.7);
    }

    #[test]
    fn test_combinators() {
        let a = FilterNode::has("A");
        let b = FilterNode::HasNone { solutions: vec!["B".into()] };
        let and = FilterNode::and(vec![a.clone(), b.clone()]);
        assert_eq!(and.selectivity(), a.selectivity() * b.selectivity());
        let or = FilterNode::or(vec![a.clone(), b.clone()]);
        assert_eq!(or.selectivity(), 0.7);
        assert!((FilterNode::not(a).selectivity() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_absent_and_empty() {
        assert_eq!(estimate_selectivity(None), 1.0);
        assert_eq!(FilterNode::and(vec![]).selectivity(), 1.0);
        assert_eq!(FilterNode::or(vec![]).selectivity(), 0.0);
        assert_eq!(FilterNode::HasAny { solutions: vec![] }.selectivity(), 0.0);
        assert_eq!(FilterNode::HasAll { solutions: vec![] }.selectivity(), 1.0);
    }
}
