//! Compiler module: compiles filter trees into relational predicates.
//!
//! Fully translatable nodes compile to exact predicates. Sequence filters compile to a
//! narrowing predicate that over-approximates them, so the in-memory residual can
//! confirm ordering. For the approximation to stay sound the builder tracks polarity:
//! under an odd number of negations a sequence compiles to `false` instead.

use crate::config::ExcludedAttributes;
use crate::expr::{AttributeDiff, FilterNode, SequenceItem, SolutionCondition, SolutionField, StringOperator, TargetMode};
use crate::ir::{AttributePredicate, DiffTargets, LayerPredicate, Predicate, StringTest};
use crate::prefetch::PrefetchResults;
use crate::types::AttributeType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    fn flip(self) -> Polarity {
        match self {
            Polarity::Positive => Polarity::Negative,
            Polarity::Negative => Polarity::Positive,
        }
    }

    /// The constant that over-approximates an undecidable node in this position.
    fn widest(self) -> bool {
        self == Polarity::Positive
    }
}

/// Builds `Predicate`s from filter trees.
///
/// A builder is cheap and holds only borrowed configuration. For hybrid plans, build
/// once without lookups, run the declared pre-fetch operations, then build again with a
/// fresh builder carrying the results.
#[derive(Debug, Clone, Copy)]
pub struct PredicateBuilder<'a> {
    excluded: &'a ExcludedAttributes,
    prefetch: Option<&'a PrefetchResults>,
}

impl<'a> PredicateBuilder<'a> {
    pub fn new(excluded: &'a ExcludedAttributes) -> Self {
        Self { excluded, prefetch: None }
    }

    pub fn with_prefetch(mut self, results: &'a PrefetchResults) -> Self {
        self.prefetch = Some(results);
        self
    }

    /// Compiles a possibly absent filter. An absent filter matches everything.
    pub fn build(&self, filter: Option<&FilterNode>) -> Predicate {
        match filter {
            Some(node) => {
                let predicate = self.component(node, Polarity::Positive);
                log::trace!("compiled {} filter to {}", node.kind(), predicate);
                predicate
            }
            None => Predicate::Const(true),
        }
    }

    fn component(&self, node: &FilterNode, polarity: Polarity) -> Predicate {
        match node {
            FilterNode::Attribute { attribute, operator, value } => Predicate::Field {
                field: *attribute,
                test: StringTest::from_operator(*operator, value),
            },
            FilterNode::ComponentType { value } => Predicate::Field {
                field: crate::expr::AttributeTarget::ComponentType,
                test: StringTest::Equals(value.clone()),
            },
            FilterNode::LayerQuery { child: None } | FilterNode::Not { child: None } => Predicate::Const(true),
            FilterNode::LayerQuery { child: Some(child) } => Predicate::any_layer(self.layer(child, polarity)),
            FilterNode::Managed { .. }
            | FilterNode::Publisher { .. }
            | FilterNode::SolutionQuery(_)
            | FilterNode::LayerAttribute { .. }
            | FilterNode::LayerAttributeQuery { .. }
            | FilterNode::HasRelevantChanges { .. }
            | FilterNode::HasAttributeDiff(_)
            | FilterNode::Has { .. } => Predicate::any_layer(self.layer(node, polarity)),
            FilterNode::HasAny { solutions } => Predicate::any(solutions.iter().map(|s| has(s))),
            FilterNode::HasAll { solutions } => Predicate::all(solutions.iter().map(|s| has(s))),
            FilterNode::HasNone { solutions } => Predicate::any(solutions.iter().map(|s| has(s))).negate(),
            FilterNode::And { children } => Predicate::all(children.iter().map(|c| self.component(c, polarity))),
            FilterNode::Or { children } => Predicate::any(children.iter().map(|c| self.component(c, polarity))),
            FilterNode::Not { child: Some(child) } => self.component(child, polarity.flip()).negate(),
            FilterNode::OrderStrict { sequence } | FilterNode::OrderFlex { sequence } => match polarity {
                Polarity::Positive => self.narrow_sequence(sequence),
                Polarity::Negative => Predicate::Const(false),
            },
            FilterNode::Unknown => {
                log::warn!("cannot compile unrecognized filter kind; widening to {}", polarity.widest());
                Predicate::Const(polarity.widest())
            }
        }
    }

    /// Compiles a node evaluated against one layer of the component.
    fn layer(&self, node: &FilterNode, polarity: Polarity) -> LayerPredicate {
        match node {
            FilterNode::Attribute { .. }
            | FilterNode::ComponentType { .. }
            | FilterNode::LayerQuery { .. }
            | FilterNode::OrderStrict { .. }
            | FilterNode::OrderFlex { .. } => LayerPredicate::outer(self.component(node, polarity)),
            FilterNode::Managed { value } => LayerPredicate::Managed(*value),
            FilterNode::Publisher { operator, value } => LayerPredicate::Solution {
                field: SolutionField::Publisher,
                test: StringTest::from_operator(*operator, value),
            },
            FilterNode::SolutionQuery(condition) => solution_condition(condition),
            FilterNode::LayerAttribute { attribute_name, operator, value, attribute_type } => {
                LayerPredicate::any_attribute(layer_attribute(attribute_name, *operator, value, *attribute_type))
            }
            FilterNode::LayerAttributeQuery { solution, child } => {
                let scoped = match child {
                    Some(child) => self.layer(child, polarity),
                    None => LayerPredicate::Const(true),
                };
                LayerPredicate::all([named(solution), scoped])
            }
            FilterNode::HasRelevantChanges { solution } => self.relevant_changes(solution.as_deref()),
            FilterNode::HasAttributeDiff(diff) => self.attribute_diff(diff),
            FilterNode::And { children } => LayerPredicate::all(children.iter().map(|c| self.layer(c, polarity))),
            FilterNode::Or { children } => LayerPredicate::any(children.iter().map(|c| self.layer(c, polarity))),
            FilterNode::Not { child: None } => LayerPredicate::Const(true),
            FilterNode::Not { child: Some(child) } => self.layer(child, polarity.flip()).negate(),
            FilterNode::Has { solution } => named(solution),
            FilterNode::HasAny { solutions } => LayerPredicate::any(solutions.iter().map(|s| named(s))),
            FilterNode::HasAll { solutions } => LayerPredicate::all(solutions.iter().map(|s| named(s))),
            FilterNode::HasNone { solutions } => LayerPredicate::any(solutions.iter().map(|s| named(s))).negate(),
            FilterNode::Unknown => {
                log::warn!("cannot compile unrecognized filter kind; widening to {}", polarity.widest());
                LayerPredicate::Const(polarity.widest())
            }
        }
    }

    fn not_excluded(&self) -> AttributePredicate {
        if self.excluded.is_empty() {
            AttributePredicate::Const(true)
        } else {
            AttributePredicate::NameIn(self.excluded.names().map(str::to_string).collect()).negate()
        }
    }

    fn relevant_changes(&self, solution: Option<&str>) -> LayerPredicate {
        let changed = AttributePredicate::all([AttributePredicate::Changed(true), self.not_excluded()]);
        LayerPredicate::all([
            solution.map_or(LayerPredicate::Const(true), named),
            LayerPredicate::any_attribute(changed),
        ])
    }

    fn attribute_diff(&self, diff: &AttributeDiff) -> LayerPredicate {
        let mut candidates = Vec::new();
        if diff.only_changed_attributes {
            candidates.push(AttributePredicate::Changed(true));
            candidates.push(self.not_excluded());
        }
        if !diff.attribute_names.is_empty() {
            candidates.push(AttributePredicate::NameIn(lowercased(&diff.attribute_names)));
        }
        let targets = match diff.target_mode {
            TargetMode::AllBelow => DiffTargets::LowerOrdinal,
            TargetMode::Specific => DiffTargets::Solutions(lowercased(&diff.target_solutions)),
        };
        LayerPredicate::all([
            named(&diff.source_solution),
            LayerPredicate::AttributeDiff {
                candidates: Box::new(AttributePredicate::all(candidates)),
                logic: diff.attribute_match_logic,
                targets,
            },
        ])
    }

    /// Necessary conditions for a sequence to match: its literal solutions are present,
    /// each choice group has one option present, and, when lookups were supplied,
    /// ordinal bounds and resolved dynamic steps are enforced.
    fn narrow_sequence(&self, sequence: &[SequenceItem]) -> Predicate {
        let mut parts = Vec::with_capacity(sequence.len());
        for (idx, item) in sequence.iter().enumerate() {
            match item {
                SequenceItem::Literal(name) => {
                    let mut layer = vec![named(name)];
                    layer.extend(self.ordinal_bounds(sequence, idx));
                    parts.push(Predicate::any_layer(LayerPredicate::all(layer)));
                }
                SequenceItem::ChoiceGroup(options) => {
                    parts.push(Predicate::any(options.iter().map(|o| has(o))));
                }
                SequenceItem::DynamicQuery(raw) => {
                    let resolved = match (self.prefetch, raw.parse()) {
                        (Some(results), Ok(condition)) => results.resolved_solutions(&condition),
                        _ => None,
                    };
                    if let Some(names) = resolved {
                        parts.push(Predicate::any_layer(LayerPredicate::SolutionIn(names.to_vec())));
                    }
                }
            }
        }
        Predicate::all(parts)
    }

    /// A layer matching literal step `idx` sits above every earlier literal step's
    /// lowest ordinal and below every later literal step's highest ordinal.
    fn ordinal_bounds(&self, sequence: &[SequenceItem], idx: usize) -> Vec<LayerPredicate> {
        let Some(results) = self.prefetch else {
            return Vec::new();
        };
        let range_of = |item: &SequenceItem| match item {
            SequenceItem::Literal(name) => results.ordinal_range(name),
            _ => None,
        };
        let lower = sequence[..idx].iter().filter_map(range_of).map(|r| r.min).max();
        let upper = sequence[idx + 1..].iter().filter_map(range_of).map(|r| r.max).min();
        let mut bounds = Vec::new();
        if let Some(lower) = lower {
            bounds.push(LayerPredicate::OrdinalAbove(lower));
        }
        if let Some(upper) = upper {
            bounds.push(LayerPredicate::OrdinalBelow(upper));
        }
        bounds
    }
}

fn named(solution: &str) -> LayerPredicate {
    LayerPredicate::Solution {
        field: SolutionField::Name,
        test: StringTest::Equals(solution.to_string()),
    }
}

fn has(solution: &str) -> Predicate {
    Predicate::any_layer(named(solution))
}

fn solution_condition(condition: &SolutionCondition) -> LayerPredicate {
    LayerPredicate::Solution {
        field: condition.attribute,
        test: StringTest::from_operator(condition.operator, &condition.value),
    }
}

fn layer_attribute(
    name: &str,
    operator: StringOperator,
    value: &str,
    attribute_type: Option<AttributeType>,
) -> AttributePredicate {
    AttributePredicate::all([
        AttributePredicate::Name(StringTest::Equals(name.to_string())),
        AttributePredicate::Value(StringTest::from_operator(operator, value)),
        attribute_type.map_or(AttributePredicate::Const(true), AttributePredicate::TypeIs),
    ])
}

fn lowercased(names: &[String]) -> Vec<String> {
    names.iter().map(|n| n.to_lowercase()).collect()
}
