//! Intermediate Representation (IR) for relational pushdown.
//!
//! A `Predicate` is the boolean expression handed to the store's native query facility.
//! It is scoped in three levels: component (`Predicate`), layer (`LayerPredicate`) and
//! layer attribute (`AttributePredicate`). Each level can reach the next one through an
//! existential quantifier.
//!
//! `matches` executes the IR with relational semantics (case-folded comparisons, LIKE
//! patterns with an escape character) so a store without its own engine can run it, and
//! `Display` renders it as SQL-like text for diagnostics.

use crate::expr::{AttributeTarget, MatchLogic, SolutionField, StringOperator};
use crate::types::{AttributeType, Component, Layer, LayerAttribute};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Escape character used in generated LIKE patterns.
pub const LIKE_ESCAPE: char = '\\';

/// A comparison against one string column, case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringTest {
    Equals(String),
    NotEquals(String),
    /// LIKE pattern: `%` is any run, `_` is any single character, `\` escapes.
    Like(String),
}

impl StringTest {
    /// Translates a filter operator. User input is escaped so it is always literal.
    pub fn from_operator(operator: StringOperator, value: &str) -> StringTest {
        match operator {
            StringOperator::Equals => StringTest::Equals(value.to_string()),
            StringOperator::NotEquals => StringTest::NotEquals(value.to_string()),
            StringOperator::Contains => StringTest::Like(format!("%{}%", escape_like(value))),
            StringOperator::BeginsWith => StringTest::Like(format!("{}%", escape_like(value))),
            StringOperator::EndsWith => StringTest::Like(format!("%{}", escape_like(value))),
        }
    }

    pub fn matches(&self, input: &str) -> bool {
        let input = input.to_lowercase();
        match self {
            StringTest::Equals(v) => input == v.to_lowercase(),
            StringTest::NotEquals(v) => input != v.to_lowercase(),
            StringTest::Like(pattern) => {
                let s: Vec<char> = input.chars().collect();
                let p: Vec<char> = pattern.to_lowercase().chars().collect();
                like_match_chars(&s, &p)
            }
        }
    }
}

/// Escapes LIKE metacharacters in user input.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

fn like_match_chars(s: &[char], pat: &[char]) -> bool {
    match pat.first() {
        None => s.is_empty(),
        Some('%') => {
            // Collapse runs of '%' before backtracking.
            let rest = &pat[1..];
            if rest.first() == Some(&'%') {
                return like_match_chars(s, rest);
            }
            (0..=s.len()).any(|i| like_match_chars(&s[i..], rest))
        }
        Some('_') => !s.is_empty() && like_match_chars(&s[1..], &pat[1..]),
        Some(&LIKE_ESCAPE) if pat.len() > 1 => {
            !s.is_empty() && s[0] == pat[1] && like_match_chars(&s[1..], &pat[2..])
        }
        Some(c) => !s.is_empty() && s[0] == *c && like_match_chars(&s[1..], &pat[1..]),
    }
}

/// Which layers an attribute diff compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffTargets {
    /// Every layer with a strictly lower ordinal than the source layer.
    LowerOrdinal,
    /// Layers of these solutions (lowercased), excluding the source layer.
    Solutions(Vec<String>),
}

/// Predicate over one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Const(bool),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Component column; optional columns coalesce to "".
    Field { field: AttributeTarget, test: StringTest },
    /// Some layer of the component satisfies the inner predicate.
    AnyLayer(Box<LayerPredicate>),
}

/// Predicate over one layer, correlated with its owning component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerPredicate {
    Const(bool),
    And(Vec<LayerPredicate>),
    Or(Vec<LayerPredicate>),
    Not(Box<LayerPredicate>),
    /// Layer column; optional columns coalesce to "".
    Solution { field: SolutionField, test: StringTest },
    /// Solution name is one of these (lowercased).
    SolutionIn(Vec<String>),
    Managed(bool),
    OrdinalAbove(i64),
    OrdinalBelow(i64),
    /// Some attribute of the layer satisfies the inner predicate.
    AnyAttribute(Box<AttributePredicate>),
    /// The layer's candidate attributes have no same-named, same-hash counterpart among
    /// the target layers' attributes.
    AttributeDiff {
        candidates: Box<AttributePredicate>,
        logic: MatchLogic,
        targets: DiffTargets,
    },
    /// A component-scope predicate evaluated against the owning component.
    Outer(Box<Predicate>),
}

/// Predicate over one layer attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributePredicate {
    Const(bool),
    And(Vec<AttributePredicate>),
    Or(Vec<AttributePredicate>),
    Not(Box<AttributePredicate>),
    Name(StringTest),
    Value(StringTest),
    TypeIs(AttributeType),
    Changed(bool),
    /// Name is one of these (lowercased).
    NameIn(Vec<String>),
}

macro_rules! connectives {
    ($($ty:ident),* $(,)?) => {
        $(
            impl $ty {
                /// Conjunction with constant folding and flattening.
                pub fn all(parts: impl IntoIterator<Item = $ty>) -> $ty {
                    let mut kept = Vec::new();
                    for part in parts {
                        match part {
                            $ty::Const(true) => {}
                            $ty::Const(false) => return $ty::Const(false),
                            $ty::And(inner) => kept.extend(inner),
                            other => kept.push(other),
                        }
                    }
                    match kept.len() {
                        0 => $ty::Const(true),
                        1 => kept.remove(0),
                        _ => $ty::And(kept),
                    }
                }

                /// Disjunction with constant folding and flattening.
                pub fn any(parts: impl IntoIterator<Item = $ty>) -> $ty {
                    let mut kept = Vec::new();
                    for part in parts {
                        match part {
                            $ty::Const(false) => {}
                            $ty::Const(true) => return $ty::Const(true),
                            $ty::Or(inner) => kept.extend(inner),
                            other => kept.push(other),
                        }
                    }
                    match kept.len() {
                        0 => $ty::Const(false),
                        1 => kept.remove(0),
                        _ => $ty::Or(kept),
                    }
                }

                pub fn negate(self) -> $ty {
                    match self {
                        $ty::Const(b) => $ty::Const(!b),
                        $ty::Not(inner) => *inner,
                        other => $ty::Not(Box::new(other)),
                    }
                }

                pub fn is_const(&self, value: bool) -> bool {
                    matches!(self, $ty::Const(b) if *b == value)
                }
            }
        )*
    };
}

connectives!(Predicate, LayerPredicate, AttributePredicate);

impl Predicate {
    pub fn any_layer(inner: LayerPredicate) -> Predicate {
        match inner {
            LayerPredicate::Const(false) => Predicate::Const(false),
            other => Predicate::AnyLayer(Box::new(other)),
        }
    }

    pub fn matches(&self, component: &Component) -> bool {
        match self {
            Predicate::Const(b) => *b,
            Predicate::And(parts) => parts.iter().all(|p| p.matches(component)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(component)),
            Predicate::Not(inner) => !inner.matches(component),
            Predicate::Field { field, test } => test.matches(component_column(component, *field)),
            Predicate::AnyLayer(inner) => component.layers().iter().any(|l| inner.matches(component, l)),
        }
    }
}

impl LayerPredicate {
    pub fn any_attribute(inner: AttributePredicate) -> LayerPredicate {
        match inner {
            AttributePredicate::Const(false) => LayerPredicate::Const(false),
            other => LayerPredicate::AnyAttribute(Box::new(other)),
        }
    }

    pub fn outer(inner: Predicate) -> LayerPredicate {
        match inner {
            Predicate::Const(b) => LayerPredicate::Const(b),
            other => LayerPredicate::Outer(Box::new(other)),
        }
    }

    pub fn matches(&self, component: &Component, layer: &Layer) -> bool {
        match self {
            LayerPredicate::Const(b) => *b,
            LayerPredicate::And(parts) => parts.iter().all(|p| p.matches(component, layer)),
            LayerPredicate::Or(parts) => parts.iter().any(|p| p.matches(component, layer)),
            LayerPredicate::Not(inner) => !inner.matches(component, layer),
            LayerPredicate::Solution { field, test } => test.matches(layer_column(layer, *field)),
            LayerPredicate::SolutionIn(names) => {
                let name = layer.solution_name.to_lowercase();
                names.iter().any(|n| *n == name)
            }
            LayerPredicate::Managed(m) => layer.managed == *m,
            LayerPredicate::OrdinalAbove(bound) => layer.ordinal > *bound,
            LayerPredicate::OrdinalBelow(bound) => layer.ordinal < *bound,
            LayerPredicate::AnyAttribute(inner) => layer.attributes.iter().any(|a| inner.matches(a)),
            LayerPredicate::AttributeDiff { candidates, logic, targets } => {
                attribute_diff(component, layer, candidates, *logic, targets)
            }
            LayerPredicate::Outer(inner) => inner.matches(component),
        }
    }
}

impl AttributePredicate {
    pub fn matches(&self, attribute: &LayerAttribute) -> bool {
        match self {
            AttributePredicate::Const(b) => *b,
            AttributePredicate::And(parts) => parts.iter().all(|p| p.matches(attribute)),
            AttributePredicate::Or(parts) => parts.iter().any(|p| p.matches(attribute)),
            AttributePredicate::Not(inner) => !inner.matches(attribute),
            AttributePredicate::Name(test) => test.matches(&attribute.name),
            AttributePredicate::Value(test) => test.matches(&attribute.value),
            AttributePredicate::TypeIs(ty) => attribute.attribute_type == *ty,
            AttributePredicate::Changed(c) => attribute.changed == *c,
            AttributePredicate::NameIn(names) => {
                let name = attribute.name.to_lowercase();
                names.iter().any(|n| *n == name)
            }
        }
    }
}

fn component_column(component: &Component, field: AttributeTarget) -> &str {
    match field {
        AttributeTarget::LogicalName => &component.logical_name,
        AttributeTarget::DisplayName => component.display_name.as_deref().unwrap_or(""),
        AttributeTarget::ComponentType => &component.component_type,
        AttributeTarget::TableLogicalName => component.table_logical_name.as_deref().unwrap_or(""),
    }
}

fn layer_column(layer: &Layer, field: SolutionField) -> &str {
    match field {
        SolutionField::Name => &layer.solution_name,
        SolutionField::Publisher => layer.publisher.as_deref().unwrap_or(""),
        SolutionField::Version => layer.version.as_deref().unwrap_or(""),
    }
}

fn attribute_diff(
    component: &Component,
    source: &Layer,
    candidates: &AttributePredicate,
    logic: MatchLogic,
    targets: &DiffTargets,
) -> bool {
    let target_layers: Vec<&Layer> = component
        .layers()
        .iter()
        .filter(|t| match targets {
            DiffTargets::LowerOrdinal => t.ordinal < source.ordinal,
            DiffTargets::Solutions(names) => {
                t.ordinal != source.ordinal && names.contains(&t.solution_name.to_lowercase())
            }
        })
        .collect();
    let no_counterpart = |a: &LayerAttribute| {
        let name = a.name.to_lowercase();
        !target_layers
            .iter()
            .flat_map(|t| t.attributes.iter())
            .any(|b| b.content_hash == a.content_hash && b.name.to_lowercase() == name)
    };
    let mut selected = source.attributes.iter().filter(|a| candidates.matches(a)).peekable();
    match logic {
        MatchLogic::Any => selected.any(no_counterpart),
        MatchLogic::All => selected.peek().is_some() && selected.all(no_counterpart),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn write_test(f: &mut fmt::Formatter<'_>, column: &str, test: &StringTest) -> fmt::Result {
    match test {
        StringTest::Equals(v) => write!(f, "LOWER({}) = LOWER({})", column, quote(v)),
        StringTest::NotEquals(v) => write!(f, "LOWER({}) <> LOWER({})", column, quote(v)),
        StringTest::Like(p) => write!(f, "LOWER({}) LIKE LOWER({}) ESCAPE '{}'", column, quote(p), LIKE_ESCAPE),
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, parts: &[T], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", sep)?;
        }
        write!(f, "{}", part)?;
    }
    write!(f, ")")
}

fn write_in(f: &mut fmt::Formatter<'_>, column: &str, names: &[String]) -> fmt::Result {
    let quoted: Vec<String> = names.iter().map(|n| quote(n)).collect();
    write!(f, "LOWER({}) IN ({})", column, quoted.join(", "))
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Const(true) => write!(f, "TRUE"),
            Predicate::Const(false) => write!(f, "FALSE"),
            Predicate::And(parts) => write_list(f, parts, "AND"),
            Predicate::Or(parts) => write_list(f, parts, "OR"),
            Predicate::Not(inner) => write!(f, "NOT ({})", inner),
            Predicate::Field { field, test } => {
                let column = match field {
                    AttributeTarget::LogicalName => "c.logical_name".to_string(),
                    AttributeTarget::DisplayName => "COALESCE(c.display_name, '')".to_string(),
                    AttributeTarget::ComponentType => "c.component_type".to_string(),
                    AttributeTarget::TableLogicalName => "COALESCE(c.table_logical_name, '')".to_string(),
                };
                write_test(f, &column, test)
            }
            Predicate::AnyLayer(inner) => {
                write!(f, "EXISTS (SELECT 1 FROM layers l WHERE l.component_id = c.id AND {})", inner)
            }
        }
    }
}

impl fmt::Display for LayerPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerPredicate::Const(true) => write!(f, "TRUE"),
            LayerPredicate::Const(false) => write!(f, "FALSE"),
            LayerPredicate::And(parts) => write_list(f, parts, "AND"),
            LayerPredicate::Or(parts) => write_list(f, parts, "OR"),
            LayerPredicate::Not(inner) => write!(f, "NOT ({})", inner),
            LayerPredicate::Solution { field, test } => {
                let column = match field {
                    SolutionField::Name => "l.solution_name",
                    SolutionField::Publisher => "COALESCE(l.publisher, '')",
                    SolutionField::Version => "COALESCE(l.version, '')",
                };
                write_test(f, column, test)
            }
            LayerPredicate::SolutionIn(names) => write_in(f, "l.solution_name", names),
            LayerPredicate::Managed(m) => write!(f, "l.managed = {}", m),
            LayerPredicate::OrdinalAbove(n) => write!(f, "l.ordinal > {}", n),
            LayerPredicate::OrdinalBelow(n) => write!(f, "l.ordinal < {}", n),
            LayerPredicate::AnyAttribute(inner) => {
                write!(f, "EXISTS (SELECT 1 FROM layer_attributes a WHERE a.layer_id = l.id AND {})", inner)
            }
            LayerPredicate::AttributeDiff { candidates, logic, targets } => {
                let target = match targets {
                    DiffTargets::LowerOrdinal => "t.ordinal < l.ordinal".to_string(),
                    DiffTargets::Solutions(names) => {
                        let quoted: Vec<String> = names.iter().map(|n| quote(n)).collect();
                        format!("t.ordinal <> l.ordinal AND LOWER(t.solution_name) IN ({})", quoted.join(", "))
                    }
                };
                let counterpart = format!(
                    "EXISTS (SELECT 1 FROM layers t JOIN layer_attributes b ON b.layer_id = t.id \
                     WHERE t.component_id = l.component_id AND {} AND LOWER(b.name) = LOWER(a.name) \
                     AND b.content_hash = a.content_hash)",
                    target
                );
                match logic {
                    MatchLogic::Any => write!(
                        f,
                        "EXISTS (SELECT 1 FROM layer_attributes a WHERE a.layer_id = l.id AND {} AND NOT {})",
                        candidates, counterpart
                    ),
                    MatchLogic::All => write!(
                        f,
                        "EXISTS (SELECT 1 FROM layer_attributes a WHERE a.layer_id = l.id AND {}) \
                         AND NOT EXISTS (SELECT 1 FROM layer_attributes a WHERE a.layer_id = l.id AND {} AND {})",
                        candidates, candidates, counterpart
                    ),
                }
            }
            LayerPredicate::Outer(inner) => write!(f, "{}", inner),
        }
    }
}

impl fmt::Display for AttributePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributePredicate::Const(true) => write!(f, "TRUE"),
            AttributePredicate::Const(false) => write!(f, "FALSE"),
            AttributePredicate::And(parts) => write_list(f, parts, "AND"),
            AttributePredicate::Or(parts) => write_list(f, parts, "OR"),
            AttributePredicate::Not(inner) => write!(f, "NOT ({})", inner),
            AttributePredicate::Name(test) => write_test(f, "a.name", test),
            AttributePredicate::Value(test) => write_test(f, "a.value", test),
            AttributePredicate::TypeIs(ty) => write!(f, "a.attribute_type = {}", quote(ty.as_str())),
            AttributePredicate::Changed(c) => write!(f, "a.changed = {}", c),
            AttributePredicate::NameIn(names) => write_in(f, "a.name", names),
        }
    }
}
