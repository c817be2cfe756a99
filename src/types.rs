//! Types module: read-only projections of components, layers and layer attributes.
//!
//! These are the shapes supplied by the persistence layer. They are immutable for the
//! duration of a filter evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

wire_tag! {
    /// Type tag carried by a layer attribute.
    pub enum AttributeType {
        String => "String" | "text",
        Number => "Number" | "integer" | "decimal",
        Boolean => "Boolean" | "bool",
        DateTime => "DateTime" | "date",
        Json => "Json",
        Xml => "Xml",
        EntityReference => "EntityReference",
        OptionSet => "OptionSet" | "picklist",
        Money => "Money",
        Lookup => "Lookup",
    }
}

/// Lowercases a wire tag and drops separators so `entity_reference`, `Entity-Reference`
/// and `EntityReference` all compare equal.
pub(crate) fn normalize_tag(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// One named value extracted from a layer.
///
/// `content_hash` is the only thing diff filters compare; raw values are never assumed
/// to be comparable across storage backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerAttribute {
    pub name: String,
    pub value: String,
    pub attribute_type: AttributeType,
    #[serde(default)]
    pub changed: bool,
    pub content_hash: String,
}

impl LayerAttribute {
    /// Builds an attribute whose content hash is computed locally from its type and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>, attribute_type: AttributeType) -> Self {
        let value = value.into();
        let content_hash = content_hash(attribute_type, &value);
        Self {
            name: name.into(),
            value,
            attribute_type,
            changed: false,
            content_hash,
        }
    }

    pub fn changed(mut self, changed: bool) -> Self {
        self.changed = changed;
        self
    }

    pub fn with_hash(mut self, content_hash: impl Into<String>) -> Self {
        self.content_hash = content_hash.into();
        self
    }
}

/// SHA-256 over the type tag and value, hex encoded.
pub fn content_hash(attribute_type: AttributeType, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(attribute_type.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One solution's contribution to a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub solution_name: String,
    pub ordinal: i64,
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: Vec<LayerAttribute>,
}

impl Layer {
    pub fn new(solution_name: impl Into<String>, ordinal: i64) -> Self {
        Self {
            solution_name: solution_name.into(),
            ordinal,
            managed: false,
            publisher: None,
            version: None,
            created_on: None,
            attributes: Vec::new(),
        }
    }

    pub fn managed(mut self, managed: bool) -> Self {
        self.managed = managed;
        self
    }

    pub fn publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn attribute(mut self, attribute: LayerAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }
}

/// The entity being filtered.
///
/// Layers are kept sorted by ordinal; ordinals are unique within a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub logical_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub component_type: String,
    #[serde(default)]
    pub table_logical_name: Option<String>,
    #[serde(default)]
    layers: Vec<Layer>,
}

impl Component {
    pub fn new(logical_name: impl Into<String>, component_type: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            display_name: None,
            component_type: component_type.into(),
            table_logical_name: None,
            layers: Vec::new(),
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn table(mut self, table_logical_name: impl Into<String>) -> Self {
        self.table_logical_name = Some(table_logical_name.into());
        self
    }

    /// Adds a layer, keeping the collection ordered by ordinal.
    pub fn layer(mut self, layer: Layer) -> Self {
        let idx = self.layers.partition_point(|l| l.ordinal <= layer.ordinal);
        self.layers.insert(idx, layer);
        self
    }

    /// Layers in ascending ordinal order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Re-establishes ordinal order after deserialization from an untrusted payload.
    pub fn normalize(mut self) -> Self {
        self.layers.sort_by_key(|l| l.ordinal);
        self
    }
}
