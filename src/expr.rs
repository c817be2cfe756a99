//! Expression (AST) module: the closed vocabulary of filter nodes.
//!
//! Filter trees arrive as JSON, tagged on `type`. They are built once and never mutated;
//! classification, predicate building and evaluation all borrow them.

use crate::types::AttributeType;
use crate::LayerFilterError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

wire_tag! {
    /// String comparison applied by leaf filters. All comparisons ignore case.
    pub enum StringOperator {
        Equals => "Equals" | "eq" | "==" | "equal",
        NotEquals => "NotEquals" | "ne" | "neq" | "!=" | "notequal",
        Contains => "Contains" | "like",
        BeginsWith => "BeginsWith" | "startswith",
        EndsWith => "EndsWith",
    }
}

impl Default for StringOperator {
    fn default() -> Self {
        StringOperator::Equals
    }
}

impl StringOperator {
    /// In-memory semantics of the operator: `input <op> operand`, case-insensitively.
    ///
    /// The relational path implements the same operators independently as LIKE patterns.
    pub fn apply(&self, input: &str, operand: &str) -> bool {
        let input = input.to_lowercase();
        let operand = operand.to_lowercase();
        match self {
            StringOperator::Equals => input == operand,
            StringOperator::NotEquals => input != operand,
            StringOperator::Contains => input.contains(&operand),
            StringOperator::BeginsWith => input.starts_with(&operand),
            StringOperator::EndsWith => input.ends_with(&operand),
        }
    }
}

wire_tag! {
    /// Component field addressed by an `ATTRIBUTE` filter.
    pub enum AttributeTarget {
        LogicalName => "LogicalName" | "name" | "schemaname",
        DisplayName => "DisplayName",
        ComponentType => "ComponentType" | "type",
        TableLogicalName => "TableLogicalName" | "table" | "tablename" | "entitylogicalname",
    }
}

wire_tag! {
    /// Layer property addressed by solution queries.
    pub enum SolutionField {
        Name => "Name" | "uniquename" | "solution" | "solutionname",
        Publisher => "Publisher" | "publishername",
        Version => "Version",
    }
}

wire_tag! {
    /// Which layers a `HAS_ATTRIBUTE_DIFF` source layer is compared against.
    pub enum TargetMode {
        AllBelow => "AllBelow" | "below" | "alllower" | "lower",
        Specific => "Specific" | "specificsolutions" | "explicit" | "targets",
    }
}

impl Default for TargetMode {
    fn default() -> Self {
        TargetMode::AllBelow
    }
}

wire_tag! {
    /// Whether one differing attribute suffices or every candidate must differ.
    pub enum MatchLogic {
        Any => "Any" | "or",
        All => "All" | "and",
    }
}

impl Default for MatchLogic {
    fn default() -> Self {
        MatchLogic::Any
    }
}

/// A typed condition on one layer property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionCondition {
    pub attribute: SolutionField,
    #[serde(default)]
    pub operator: StringOperator,
    pub value: String,
}

impl SolutionCondition {
    pub fn new(attribute: SolutionField, operator: StringOperator, value: impl Into<String>) -> Self {
        Self { attribute, operator, value: value.into() }
    }

    /// Composite key used to deduplicate dynamic resolutions. Values compare
    /// case-insensitively, so they are folded here.
    pub fn key(&self) -> SolutionCondition {
        SolutionCondition {
            attribute: self.attribute,
            operator: self.operator,
            value: self.value.to_lowercase(),
        }
    }
}

/// A dynamic step as it appeared on the wire.
///
/// Fields are kept raw so a malformed step does not reject the whole filter; it parses
/// lazily and a step that fails to parse never matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicSolutionQuery {
    #[serde(default)]
    pub attribute: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub value: String,
}

impl DynamicSolutionQuery {
    pub fn new(attribute: impl Into<String>, operator: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    pub fn parse(&self) -> Result<SolutionCondition, String> {
        Ok(SolutionCondition {
            attribute: self.attribute.parse()?,
            operator: self.operator.parse()?,
            value: self.value.clone(),
        })
    }
}

/// One step of an ordered sequence filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SequenceItem {
    /// Exactly this solution.
    Literal(String),
    /// Any one of these solutions.
    ChoiceGroup(Vec<String>),
    /// A solution whose properties satisfy a query.
    DynamicQuery(DynamicSolutionQuery),
}

/// Configuration of a `HAS_ATTRIBUTE_DIFF` node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDiff {
    pub source_solution: String,
    #[serde(default)]
    pub target_mode: TargetMode,
    #[serde(default)]
    pub target_solutions: Vec<String>,
    #[serde(default)]
    pub only_changed_attributes: bool,
    #[serde(default)]
    pub attribute_names: Vec<String>,
    #[serde(default)]
    pub attribute_match_logic: MatchLogic,
}

impl AttributeDiff {
    pub fn new(source_solution: impl Into<String>) -> Self {
        Self {
            source_solution: source_solution.into(),
            target_mode: TargetMode::AllBelow,
            target_solutions: Vec::new(),
            only_changed_attributes: false,
            attribute_names: Vec::new(),
            attribute_match_logic: MatchLogic::Any,
        }
    }
}

/// A filter node. The set of kinds is closed; anything else on the wire becomes `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum FilterNode {
    #[serde(rename = "ATTRIBUTE")]
    Attribute {
        attribute: AttributeTarget,
        #[serde(default)]
        operator: StringOperator,
        value: String,
    },
    #[serde(rename = "COMPONENT_TYPE")]
    ComponentType { value: String },
    #[serde(rename = "MANAGED")]
    Managed { value: bool },
    #[serde(rename = "PUBLISHER")]
    Publisher {
        #[serde(default)]
        operator: StringOperator,
        value: String,
    },
    /// Some layer satisfies `child` in its own scope. Without a child the node is
    /// true, even for a component with no layers.
    #[serde(rename = "LAYER_QUERY")]
    LayerQuery {
        #[serde(default)]
        child: Option<Box<FilterNode>>,
    },
    #[serde(rename = "SOLUTION_QUERY")]
    SolutionQuery(SolutionCondition),
    #[serde(rename = "LAYER_ATTRIBUTE")]
    LayerAttribute {
        attribute_name: String,
        #[serde(default)]
        operator: StringOperator,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attribute_type: Option<AttributeType>,
    },
    /// The layer of `solution` satisfies `child`. A missing child is vacuously true,
    /// so the node still requires that layer to exist.
    #[serde(rename = "LAYER_ATTRIBUTE_QUERY")]
    LayerAttributeQuery {
        solution: String,
        #[serde(default)]
        child: Option<Box<FilterNode>>,
    },
    #[serde(rename = "HAS_RELEVANT_CHANGES")]
    HasRelevantChanges {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        solution: Option<String>,
    },
    #[serde(rename = "HAS_ATTRIBUTE_DIFF")]
    HasAttributeDiff(AttributeDiff),
    #[serde(rename = "AND")]
    And {
        #[serde(default)]
        children: Vec<FilterNode>,
    },
    #[serde(rename = "OR")]
    Or {
        #[serde(default)]
        children: Vec<FilterNode>,
    },
    /// Negation. Without a child the node is true.
    #[serde(rename = "NOT")]
    Not {
        #[serde(default)]
        child: Option<Box<FilterNode>>,
    },
    #[serde(rename = "HAS")]
    Has { solution: String },
    #[serde(rename = "HAS_ANY")]
    HasAny {
        #[serde(default)]
        solutions: Vec<String>,
    },
    #[serde(rename = "HAS_ALL")]
    HasAll {
        #[serde(default)]
        solutions: Vec<String>,
    },
    #[serde(rename = "HAS_NONE")]
    HasNone {
        #[serde(default)]
        solutions: Vec<String>,
    },
    #[serde(rename = "ORDER_STRICT")]
    OrderStrict {
        #[serde(default)]
        sequence: Vec<SequenceItem>,
    },
    #[serde(rename = "ORDER_FLEX")]
    OrderFlex {
        #[serde(default)]
        sequence: Vec<SequenceItem>,
    },
    /// A kind this build does not recognize.
    #[serde(other)]
    Unknown,
}

impl FilterNode {
    pub fn from_json(input: &str) -> Result<FilterNode, LayerFilterError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn to_json(&self) -> Result<String, LayerFilterError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn and(children: Vec<FilterNode>) -> FilterNode {
        FilterNode::And { children }
    }

    pub fn or(children: Vec<FilterNode>) -> FilterNode {
        FilterNode::Or { children }
    }

    pub fn not(child: FilterNode) -> FilterNode {
        FilterNode::Not { child: Some(Box::new(child)) }
    }

    pub fn has(solution: impl Into<String>) -> FilterNode {
        FilterNode::Has { solution: solution.into() }
    }

    pub fn attribute(attribute: AttributeTarget, operator: StringOperator, value: impl Into<String>) -> FilterNode {
        FilterNode::Attribute { attribute, operator, value: value.into() }
    }

    pub fn layer_query(child: FilterNode) -> FilterNode {
        FilterNode::LayerQuery { child: Some(Box::new(child)) }
    }

    pub fn order_strict<I: Into<SequenceItem>>(sequence: impl IntoIterator<Item = I>) -> FilterNode {
        FilterNode::OrderStrict { sequence: sequence.into_iter().map(Into::into).collect() }
    }

    pub fn order_flex<I: Into<SequenceItem>>(sequence: impl IntoIterator<Item = I>) -> FilterNode {
        FilterNode::OrderFlex { sequence: sequence.into_iter().map(Into::into).collect() }
    }

    /// Wire tag of this node, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            FilterNode::Attribute { .. } => "ATTRIBUTE",
            FilterNode::ComponentType { .. } => "COMPONENT_TYPE",
            FilterNode::Managed { .. } => "MANAGED",
            FilterNode::Publisher { .. } => "PUBLISHER",
            FilterNode::LayerQuery { .. } => "LAYER_QUERY",
            FilterNode::SolutionQuery(_) => "SOLUTION_QUERY",
            FilterNode::LayerAttribute { .. } => "LAYER_ATTRIBUTE",
            FilterNode::LayerAttributeQuery { .. } => "LAYER_ATTRIBUTE_QUERY",
            FilterNode::HasRelevantChanges { .. } => "HAS_RELEVANT_CHANGES",
            FilterNode::HasAttributeDiff(_) => "HAS_ATTRIBUTE_DIFF",
            FilterNode::And { .. } => "AND",
            FilterNode::Or { .. } => "OR",
            FilterNode::Not { .. } => "NOT",
            FilterNode::Has { .. } => "HAS",
            FilterNode::HasAny { .. } => "HAS_ANY",
            FilterNode::HasAll { .. } => "HAS_ALL",
            FilterNode::HasNone { .. } => "HAS_NONE",
            FilterNode::OrderStrict { .. } => "ORDER_STRICT",
            FilterNode::OrderFlex { .. } => "ORDER_FLEX",
            FilterNode::Unknown => "UNKNOWN",
        }
    }

    /// Direct sub-filters of logical and wrapper nodes.
    pub fn children(&self) -> Vec<&FilterNode> {
        match self {
            FilterNode::And { children } | FilterNode::Or { children } => children.iter().collect(),
            FilterNode::Not { child }
            | FilterNode::LayerQuery { child }
            | FilterNode::LayerAttributeQuery { child, .. } => child.iter().map(|c| &**c).collect(),
            _ => Vec::new(),
        }
    }

    /// The sequence of an `ORDER_STRICT`/`ORDER_FLEX` node.
    pub fn sequence(&self) -> Option<&[SequenceItem]> {
        match self {
            FilterNode::OrderStrict { sequence } | FilterNode::OrderFlex { sequence } => Some(sequence),
            _ => None,
        }
    }

    /// True if this node or any descendant is a sequence filter.
    pub fn contains_sequence(&self) -> bool {
        self.sequence().is_some() || self.children().into_iter().any(FilterNode::contains_sequence)
    }

    /// Every solution name this tree references literally, lowercased.
    pub fn solution_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_solution_names(&mut names);
        names
    }

    fn collect_solution_names(&self, names: &mut BTreeSet<String>) {
        match self {
            FilterNode::Has { solution } | FilterNode::LayerAttributeQuery { solution, .. } => {
                names.insert(solution.to_lowercase());
            }
            FilterNode::HasAny { solutions } | FilterNode::HasAll { solutions } | FilterNode::HasNone { solutions } => {
                names.extend(solutions.iter().map(|s| s.to_lowercase()));
            }
            FilterNode::HasAttributeDiff(diff) => {
                names.insert(diff.source_solution.to_lowercase());
                names.extend(diff.target_solutions.iter().map(|s| s.to_lowercase()));
            }
            FilterNode::HasRelevantChanges { solution: Some(solution) } => {
                names.insert(solution.to_lowercase());
            }
            FilterNode::OrderStrict { sequence } | FilterNode::OrderFlex { sequence } => {
                for item in sequence {
                    match item {
                        SequenceItem::Literal(name) => {
                            names.insert(name.to_lowercase());
                        }
                        SequenceItem::ChoiceGroup(options) => {
                            names.extend(options.iter().map(|s| s.to_lowercase()));
                        }
                        SequenceItem::DynamicQuery(_) => {}
                    }
                }
            }
            _ => {}
        }
        for child in self.children() {
            child.collect_solution_names(names);
        }
    }
}

impl From<&str> for SequenceItem {
    fn from(value: &str) -> Self {
        SequenceItem::Literal(value.to_string())
    }
}

impl From<String> for SequenceItem {
    fn from(value: String) -> Self {
        SequenceItem::Literal(value)
    }
}

impl From<Vec<&str>> for SequenceItem {
    fn from(value: Vec<&str>) -> Self {
        SequenceItem::ChoiceGroup(value.into_iter().map(str::to_string).collect())
    }
}

impl From<DynamicSolutionQuery> for SequenceItem {
    fn from(value: DynamicSolutionQuery) -> Self {
        SequenceItem::DynamicQuery(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_tree() {
        let json = r#"{
            "type": "AND",
            "children": [
                {"type": "ATTRIBUTE", "attribute": "ComponentType", "operator": "Equals", "value": "Form"},
                {"type": "HAS_NONE", "solutions": ["Legacy"]},
                {"type": "NOT", "child": {"type": "HAS", "solution": "Patch"}}
            ]
        }"#;
        let node = FilterNode::from_json(json).unwrap();
        match node {
            FilterNode::And { children } => {
                assert_eq!(children.len(), 3);
                assert_eq!(
                    children[0],
                    FilterNode::attribute(AttributeTarget::ComponentType, StringOperator::Equals, "Form")
                );
                assert_eq!(children[2], FilterNode::not(FilterNode::has("Patch")));
            }
            _ => panic!("Expected AND"),
        }
    }

    #[test]
    fn test_parse_sequence_items() {
        let json = r#"{
            "type": "ORDER_FLEX",
            "sequence": ["Base", ["PatchA", "PatchB"], {"attribute": "Publisher", "operator": "BeginsWith", "value": "Contoso"}]
        }"#;
        let node = FilterNode::from_json(json).unwrap();
        let seq = node.sequence().unwrap();
        assert_eq!(seq[0], SequenceItem::Literal("Base".into()));
        assert_eq!(seq[1], SequenceItem::ChoiceGroup(vec!["PatchA".into(), "PatchB".into()]));
        match &seq[2] {
            SequenceItem::DynamicQuery(q) => {
                let cond = q.parse().unwrap();
                assert_eq!(cond.attribute, SolutionField::Publisher);
                assert_eq!(cond.operator, StringOperator::BeginsWith);
            }
            _ => panic!("Expected dynamic query"),
        }
    }

    #[test]
    fn test_malformed_dynamic_query_is_kept_raw() {
        let json = r#"{"type": "ORDER_STRICT", "sequence": [{"attribute": "Colour", "operator": "Equals", "value": "x"}, {"value": "y"}]}"#;
        let node = FilterNode::from_json(json).unwrap();
        for item in node.sequence().unwrap() {
            match item {
                SequenceItem::DynamicQuery(q) => assert!(q.parse().is_err()),
                _ => panic!("Expected dynamic query"),
            }
        }
    }

    #[test]
    fn test_unknown_kind_deserializes() {
        let node = FilterNode::from_json(r#"{"type": "HAS_MAGIC", "spell": 3}"#).unwrap();
        assert_eq!(node, FilterNode::Unknown);
        let node = FilterNode::from_json(r#"{"type": "OR", "children": [{"type": "FUTURE"}, {"type": "HAS", "solution": "A"}]}"#).unwrap();
        assert_eq!(node.children()[0], &FilterNode::Unknown);
    }

    #[test]
    fn test_absent_children_default() {
        let node = FilterNode::from_json(r#"{"type": "NOT"}"#).unwrap();
        assert_eq!(node, FilterNode::Not { child: None });
        let node = FilterNode::from_json(r#"{"type": "LAYER_QUERY", "child": null}"#).unwrap();
        assert_eq!(node, FilterNode::LayerQuery { child: None });
    }

    #[test]
    fn test_attribute_diff_wire_fields() {
        let json = r#"{
            "type": "HAS_ATTRIBUTE_DIFF",
            "sourceSolution": "Dev",
            "targetMode": "Specific",
            "targetSolutions": ["Base"],
            "onlyChangedAttributes": true,
            "attributeNames": ["formxml"],
            "attributeMatchLogic": "All"
        }"#;
        match FilterNode::from_json(json).unwrap() {
            FilterNode::HasAttributeDiff(diff) => {
                assert_eq!(diff.source_solution, "Dev");
                assert_eq!(diff.target_mode, TargetMode::Specific);
                assert_eq!(diff.target_solutions, vec!["Base".to_string()]);
                assert!(diff.only_changed_attributes);
                assert_eq!(diff.attribute_match_logic, MatchLogic::All);
            }
            other => panic!("Expected HAS_ATTRIBUTE_DIFF, got {:?}", other),
        }
    }

    #[test]
    fn test_serialize_uses_wire_tags() {
        let node = FilterNode::and(vec![
            FilterNode::has("A"),
            FilterNode::LayerAttribute {
                attribute_name: "formxml".into(),
                operator: StringOperator::Contains,
                value: "tab".into(),
                attribute_type: Some(AttributeType::Xml),
            },
        ]);
        let json: serde_json::Value = serde_json::from_str(&node.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "AND");
        assert_eq!(json["children"][0]["type"], "HAS");
        assert_eq!(json["children"][1]["attributeName"], "formxml");
        assert_eq!(json["children"][1]["operator"], "Contains");
        assert_eq!(json["children"][1]["attributeType"], "Xml");
    }

    #[test]
    fn test_string_operator_semantics() {
        assert!(StringOperator::Equals.apply("Contoso", "contoso"));
        assert!(StringOperator::NotEquals.apply("Contoso", "Fabrikam"));
        assert!(StringOperator::Contains.apply("ContosoCore", "SOCO"));
        assert!(StringOperator::BeginsWith.apply("ContosoCore", "cont"));
        assert!(StringOperator::EndsWith.apply("ContosoCore", "core"));
        assert!(!StringOperator::BeginsWith.apply("ContosoCore", "core"));
        assert_eq!("begins_with".parse::<StringOperator>(), Ok(StringOperator::BeginsWith));
        assert_eq!("!=".parse::<StringOperator>(), Ok(StringOperator::NotEquals));
    }

    #[test]
    fn test_solution_names_flatten_everything() {
        let node = FilterNode::and(vec![
            FilterNode::has("A"),
            FilterNode::order_flex(vec![SequenceItem::from("B"), SequenceItem::from(vec!["C", "d"])]),
        ]);
        let names: Vec<_> = node.solution_names().into_iter().collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert!(node.contains_sequence());
        assert!(!FilterNode::has("A").contains_sequence());
    }
}
