//! Schema interpretation
//!
//! Turns a tool's raw `inputSchema` into a fixed, typed shape. The raw schema
//! comes from the remote server and may be absent, empty or malformed, so
//! interpretation never fails: anything that does not fit is treated as absent.

use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Declared type of a single property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl PropertyType {
    /// Recognise one of the six supported type names; anything else is `None`
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(PropertyType::String),
            "number" => Some(PropertyType::Number),
            "integer" => Some(PropertyType::Integer),
            "boolean" => Some(PropertyType::Boolean),
            "array" => Some(PropertyType::Array),
            "object" => Some(PropertyType::Object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Number => "number",
            PropertyType::Integer => "integer",
            PropertyType::Boolean => "boolean",
            PropertyType::Array => "array",
            PropertyType::Object => "object",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a schema's `properties` mapping
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertySchema {
    pub name: String,
    pub property_type: PropertyType,
    pub description: Option<String>,
    pub enum_values: Option<Vec<JsonValue>>,
    pub default: Option<JsonValue>,
}

impl PropertySchema {
    fn interpret(name: &str, raw: &JsonValue) -> Self {
        let obj = raw.as_object();
        let field = |key: &str| obj.and_then(|o| o.get(key));

        PropertySchema {
            name: name.to_string(),
            property_type: field("type")
                .and_then(|t| t.as_str())
                .and_then(PropertyType::parse)
                .unwrap_or_default(),
            description: field("description")
                .and_then(|d| d.as_str())
                .filter(|d| !d.is_empty())
                .map(String::from),
            enum_values: field("enum").and_then(|e| e.as_array()).cloned(),
            default: field("default").cloned(),
        }
    }
}

/// Normalized, read-only view of a tool's input contract
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaNode {
    pub schema_type: String,
    /// Properties in declaration order
    pub properties: Vec<PropertySchema>,
    /// Required property names in declaration order
    pub required: Vec<String>,
    /// Names under `$defs` / `definitions`, kept for display only
    pub definitions: Vec<String>,
}

impl SchemaNode {
    /// Interpret a raw schema permissively.
    ///
    /// A value that is not an object with a `properties` mapping yields a
    /// node with no properties, which tells the collector to fall back to
    /// free-form JSON entry. Non-string `required` entries are ignored.
    pub fn interpret(raw: &JsonValue) -> Self {
        let Some(obj) = raw.as_object() else {
            return SchemaNode::empty();
        };

        let schema_type = obj
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("object")
            .to_string();

        let properties = obj
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| {
                props
                    .iter()
                    .map(|(name, raw)| PropertySchema::interpret(name, raw))
                    .collect()
            })
            .unwrap_or_default();

        let mut required: Vec<String> = Vec::new();
        if let Some(list) = obj.get("required").and_then(|r| r.as_array()) {
            for name in list.iter().filter_map(|v| v.as_str()) {
                if !required.iter().any(|r| r == name) {
                    required.push(name.to_string());
                }
            }
        }

        let definitions = ["$defs", "definitions"]
            .iter()
            .filter_map(|key| obj.get(*key).and_then(|d| d.as_object()))
            .flat_map(|defs: &Map<String, JsonValue>| defs.keys().cloned())
            .collect();

        SchemaNode {
            schema_type,
            properties,
            required,
            definitions,
        }
    }

    pub fn empty() -> Self {
        SchemaNode {
            schema_type: "object".to_string(),
            ..Default::default()
        }
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// True when there is nothing to prompt for field by field
    pub fn has_no_properties(&self) -> bool {
        self.properties.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interpret_full_schema() {
        let node = SchemaNode::interpret(&json!({
            "type": "object",
            "properties": {
                "zeta": {"type": "integer", "description": "last letter"},
                "alpha": {"type": "string", "enum": ["a", "b"], "default": "a"},
                "flag": {"type": "boolean"}
            },
            "required": ["zeta", 42, "zeta"]
        }));

        let names: Vec<_> = node.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "flag"]);
        assert_eq!(node.required, vec!["zeta".to_string()]);
        assert!(node.is_required("zeta"));
        assert!(!node.is_required("alpha"));

        let alpha = node.property("alpha").unwrap();
        assert_eq!(alpha.property_type, PropertyType::String);
        assert_eq!(alpha.enum_values, Some(vec![json!("a"), json!("b")]));
        assert_eq!(alpha.default, Some(json!("a")));
        assert_eq!(
            node.property("zeta").unwrap().description.as_deref(),
            Some("last letter")
        );
    }

    #[test]
    fn test_unknown_or_missing_type_defaults_to_string() {
        let node = SchemaNode::interpret(&json!({
            "properties": {
                "a": {"type": "uuid"},
                "b": {},
                "c": "not even an object",
                "d": {"type": ["string", "null"]}
            }
        }));
        assert!(node
            .properties
            .iter()
            .all(|p| p.property_type == PropertyType::String));
    }

    #[test]
    fn test_malformed_schemas_yield_no_properties() {
        for raw in [
            json!(null),
            json!({}),
            json!("object"),
            json!([1, 2]),
            json!({"type": "object", "properties": ["x"]}),
        ] {
            assert!(SchemaNode::interpret(&raw).has_no_properties(), "{}", raw);
        }
    }

    #[test]
    fn test_definitions_are_listed() {
        let node = SchemaNode::interpret(&json!({
            "type": "object",
            "properties": {},
            "$defs": {"Point": {"type": "object"}}
        }));
        assert_eq!(node.definitions, vec!["Point".to_string()]);
    }
}
