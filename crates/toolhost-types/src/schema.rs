//! Method descriptors and the schema tree used to describe their inputs
//! and outputs.
//!
//! The registry never evaluates these schemas (§4.2) — it only surfaces
//! them. The HTTP server is the one consumer that walks a `SchemaNode` tree,
//! and only to find `file`-typed fields for output wrapping (§4.5).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The primitive type tag carried by a schema node.
///
/// `File` is a host-level extension (not plain JSON Schema): it marks a
/// field that triggers multipart upload handling on input and reference
/// wrapping on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    /// UTF-8 string.
    String,
    /// Signed integer.
    Integer,
    /// Floating point number.
    Number,
    /// Boolean.
    Boolean,
    /// Homogeneous array, described by `items`.
    Array,
    /// Keyed object, described by `properties`/`required`.
    Object,
    /// Explicit null/unit type.
    Null,
    /// Host extension: a file, wrapped on the way out and spooled on the
    /// way in.
    File,
}

/// A node in a method's input or output schema tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaNode {
    /// The primitive type of this node.
    #[serde(rename = "type")]
    pub type_tag: SchemaType,

    /// Nested field schemas, present when `type_tag == Object`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, SchemaNode>,

    /// Names of required fields, meaningful when `type_tag == Object`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    /// Schema of array elements, present when `type_tag == Array`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaNode>>,

    /// Default value applied when the field is absent from `params`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl SchemaNode {
    /// Walk this node and every descendant, calling `visit` with the path
    /// of property names leading to each node (root path is empty).
    ///
    /// Used by the HTTP server's output-wrapping pass (§4.5) to find
    /// `file`-typed leaves without guessing from the result's shape.
    pub fn walk<'a>(&'a self, path: &mut Vec<String>, visit: &mut dyn FnMut(&[String], &'a SchemaNode)) {
        visit(path, self);
        match self.type_tag {
            SchemaType::Object => {
                for (name, child) in &self.properties {
                    path.push(name.clone());
                    child.walk(path, visit);
                    path.pop();
                }
            }
            SchemaType::Array => {
                if let Some(items) = &self.items {
                    items.walk(path, visit);
                }
            }
            _ => {}
        }
    }
}

/// Human description plus input/output schema for a single RPC method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Short human-readable description of what the method does.
    pub description: String,
    /// Schema of the `params` object a caller must supply.
    pub input_schema: SchemaNode,
    /// Schema of the value the child returns in the envelope's `result`.
    pub output_schema: SchemaNode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(t: SchemaType) -> SchemaNode {
        SchemaNode {
            type_tag: t,
            properties: BTreeMap::new(),
            required: Vec::new(),
            items: None,
            default: None,
        }
    }

    #[test]
    fn walk_finds_nested_file_field() {
        let mut properties = BTreeMap::new();
        properties.insert("image".to_string(), leaf(SchemaType::File));
        properties.insert("label".to_string(), leaf(SchemaType::String));
        let root = SchemaNode {
            type_tag: SchemaType::Object,
            properties,
            required: vec!["image".to_string()],
            items: None,
            default: None,
        };

        let mut found = Vec::new();
        let mut path = Vec::new();
        root.walk(&mut path, &mut |p, node| {
            if node.type_tag == SchemaType::File {
                found.push(p.to_vec());
            }
        });

        assert_eq!(found, vec![vec!["image".to_string()]]);
    }

    #[test]
    fn method_descriptor_round_trips_through_json() {
        let descriptor = MethodDescriptor {
            description: "add two numbers".to_string(),
            input_schema: leaf(SchemaType::Object),
            output_schema: leaf(SchemaType::Integer),
        };
        let json = serde_json::to_string(&descriptor).unwrap();
        let back: MethodDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.description, descriptor.description);
    }
}
