//! Evaluator module: direct evaluation of filter trees against materialized components.
//!
//! This is the reference semantics. Hybrid plans rely on it to confirm what the store
//! can only approximate, and tests use it as the oracle for the relational path.

use crate::config::ExcludedAttributes;
use crate::expr::{
    AttributeDiff, AttributeTarget, FilterNode, MatchLogic, SequenceItem, SolutionCondition, SolutionField,
    StringOperator, TargetMode,
};
use crate::types::{Component, Layer, LayerAttribute};

/// Evaluates filters in memory. Holds only borrowed configuration.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    excluded: &'a ExcludedAttributes,
}

fn same(a: &str, b: &str) -> bool {
    StringOperator::Equals.apply(a, b)
}

impl<'a> Evaluator<'a> {
    pub fn new(excluded: &'a ExcludedAttributes) -> Self {
        Self { excluded }
    }

    /// Evaluates a possibly absent filter. An absent filter matches everything.
    pub fn evaluate(&self, filter: Option<&FilterNode>, component: &Component) -> bool {
        filter.map_or(true, |node| self.component(node, component))
    }

    fn component(&self, node: &FilterNode, c: &Component) -> bool {
        match node {
            FilterNode::Attribute { attribute, operator, value } => operator.apply(column(c, *attribute), value),
            FilterNode::ComponentType { value } => same(&c.component_type, value),
            FilterNode::LayerQuery { child: None } | FilterNode::Not { child: None } => true,
            FilterNode::LayerQuery { child: Some(child) } => c.layers().iter().any(|l| self.layer(child, c, l)),
            FilterNode::Managed { .. }
            | FilterNode::Publisher { .. }
            | FilterNode::SolutionQuery(_)
            | FilterNode::LayerAttribute { .. }
            | FilterNode::LayerAttributeQuery { .. }
            | FilterNode::HasRelevantChanges { .. }
            | FilterNode::HasAttributeDiff(_)
            | FilterNode::Has { .. } => c.layers().iter().any(|l| self.layer(node, c, l)),
            FilterNode::HasAny { solutions } => solutions.iter().any(|s| has(c, s)),
            FilterNode::HasAll { solutions } => solutions.iter().all(|s| has(c, s)),
            FilterNode::HasNone { solutions } => !solutions.iter().any(|s| has(c, s)),
            FilterNode::And { children } => children.iter().all(|ch| self.component(ch, c)),
            FilterNode::Or { children } => children.iter().any(|ch| self.component(ch, c)),
            FilterNode::Not { child: Some(child) } => !self.component(child, c),
            FilterNode::OrderStrict { sequence } => matches_sequence(sequence, c.layers(), true),
            FilterNode::OrderFlex { sequence } => matches_sequence(sequence, c.layers(), false),
            FilterNode::Unknown => {
                log::warn!("unrecognized filter kind on {}; treating as non-matching", c.logical_name);
                false
            }
        }
    }

    fn layer(&self, node: &FilterNode, c: &Component, l: &Layer) -> bool {
        match node {
            FilterNode::Attribute { .. }
            | FilterNode::ComponentType { .. }
            | FilterNode::LayerQuery { .. }
            | FilterNode::OrderStrict { .. }
            | FilterNode::OrderFlex { .. }
            | FilterNode::Unknown => self.component(node, c),
            FilterNode::Managed { value } => l.managed == *value,
            FilterNode::Publisher { operator, value } => operator.apply(l.publisher.as_deref().unwrap_or(""), value),
            FilterNode::SolutionQuery(condition) => condition_matches(condition, l),
            FilterNode::LayerAttribute { attribute_name, operator, value, attribute_type } => {
                l.attributes.iter().any(|a| {
                    same(&a.name, attribute_name)
                        && operator.apply(&a.value, value)
                        && attribute_type.map_or(true, |ty| a.attribute_type == ty)
                })
            }
            FilterNode::LayerAttributeQuery { solution, child } => {
                same(&l.solution_name, solution) && child.as_deref().map_or(true, |ch| self.layer(ch, c, l))
            }
            FilterNode::HasRelevantChanges { solution } => {
                solution.as_deref().map_or(true, |s| same(&l.solution_name, s))
                    && l.attributes.iter().any(|a| self.is_relevant_change(a))
            }
            FilterNode::HasAttributeDiff(diff) => self.attribute_diff(diff, c, l),
            FilterNode::And { children } => children.iter().all(|ch| self.layer(ch, c, l)),
            FilterNode::Or { children } => children.iter().any(|ch| self.layer(ch, c, l)),
            FilterNode::Not { child } => child.as_deref().map_or(true, |ch| !self.layer(ch, c, l)),
            FilterNode::Has { solution } => same(&l.solution_name, solution),
            FilterNode::HasAny { solutions } => solutions.iter().any(|s| same(&l.solution_name, s)),
            FilterNode::HasAll { solutions } => solutions.iter().all(|s| same(&l.solution_name, s)),
            FilterNode::HasNone { solutions } => !solutions.iter().any(|s| same(&l.solution_name, s)),
        }
    }

    fn is_relevant_change(&self, attribute: &LayerAttribute) -> bool {
        attribute.changed && !self.excluded.contains(&attribute.name)
    }

    fn attribute_diff(&self, diff: &AttributeDiff, c: &Component, source: &Layer) -> bool {
        if !same(&source.solution_name, &diff.source_solution) {
            return false;
        }
        let targets: Vec<&Layer> = c
            .layers()
            .iter()
            .filter(|t| match diff.target_mode {
                TargetMode::AllBelow => t.ordinal < source.ordinal,
                TargetMode::Specific => {
                    t.ordinal != source.ordinal && diff.target_solutions.iter().any(|s| same(&t.solution_name, s))
                }
            })
            .collect();
        let candidates: Vec<&LayerAttribute> = source
            .attributes
            .iter()
            .filter(|a| !diff.only_changed_attributes || self.is_relevant_change(a))
            .filter(|a| diff.attribute_names.is_empty() || diff.attribute_names.iter().any(|n| same(&a.name, n)))
            .collect();
        let differs = |a: &&LayerAttribute| {
            targets.iter().all(|t| {
                t.attributes
                    .iter()
                    .all(|b| !(b.content_hash == a.content_hash && same(&b.name, &a.name)))
            })
        };
        match diff.attribute_match_logic {
            MatchLogic::Any => candidates.iter().any(differs),
            MatchLogic::All => !candidates.is_empty() && candidates.iter().all(differs),
        }
    }
}

fn column(c: &Component, target: AttributeTarget) -> &str {
    match target {
        AttributeTarget::LogicalName => &c.logical_name,
        AttributeTarget::DisplayName => c.display_name.as_deref().unwrap_or(""),
        AttributeTarget::ComponentType => &c.component_type,
        AttributeTarget::TableLogicalName => c.table_logical_name.as_deref().unwrap_or(""),
    }
}

fn has(c: &Component, solution: &str) -> bool {
    c.layers().iter().any(|l| same(&l.solution_name, solution))
}

fn condition_matches(condition: &SolutionCondition, l: &Layer) -> bool {
    let input = match condition.attribute {
        SolutionField::Name => l.solution_name.as_str(),
        SolutionField::Publisher => l.publisher.as_deref().unwrap_or(""),
        SolutionField::Version => l.version.as_deref().unwrap_or(""),
    };
    condition.operator.apply(input, &condition.value)
}

fn item_matches(item: &SequenceItem, l: &Layer) -> bool {
    match item {
        SequenceItem::Literal(name) => same(&l.solution_name, name),
        SequenceItem::ChoiceGroup(options) => options.iter().any(|o| same(&l.solution_name, o)),
        SequenceItem::DynamicQuery(raw) => match raw.parse() {
            Ok(condition) => condition_matches(&condition, l),
            Err(e) => {
                log::warn!("malformed dynamic sequence step treated as non-matching: {}", e);
                false
            }
        },
    }
}

/// Walks the sequence and the ordinal-ordered layers with two cursors.
///
/// A match advances both cursors. On a mismatch, strict mode fails at once while flex
/// mode skips the layer. The sequence matches once every step has been consumed.
pub fn matches_sequence(sequence: &[SequenceItem], layers: &[Layer], strict: bool) -> bool {
    let mut ordered: Vec<&Layer> = layers.iter().collect();
    ordered.sort_by_key(|l| l.ordinal);

    let mut step = 0;
    let mut cursor = 0;
    while step < sequence.len() && cursor < ordered.len() {
        if item_matches(&sequence[step], ordered[cursor]) {
            step += 1;
            cursor += 1;
        } else if strict {
            return false;
        } else {
            cursor += 1;
        }
    }
    step == sequence.len()
}
