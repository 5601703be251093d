//! Output wrapping: replace `file`-typed result fields with reference
//! objects (§4.5: "Output wrapping").

use std::path::PathBuf;

use serde_json::Value;
use toolhost_filestore::OutputRefManager;
use toolhost_types::{SchemaNode, SchemaType};
use tracing::warn;

fn file_field_paths(schema: &SchemaNode) -> Vec<Vec<String>> {
    let mut paths = Vec::new();
    let mut path = Vec::new();
    schema.walk(&mut path, &mut |p, node| {
        if node.type_tag == SchemaType::File {
            paths.push(p.to_vec());
        }
    });
    paths
}

fn navigate_mut<'a>(value: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    let mut current = value;
    for segment in path {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}

/// Walk `result` against `output_schema`; for every `file`-typed field
/// whose value is a string naming an existing path, replace it with the
/// `{ref, url, path, size, media_type, created_at}` object returned by
/// wrapping it through `manager`.
pub async fn wrap_file_fields(result: &mut Value, output_schema: &SchemaNode, manager: &OutputRefManager, url_base: &str) {
    for path in file_field_paths(output_schema) {
        let Some(slot) = navigate_mut(result, &path) else { continue };
        let Value::String(raw_path) = slot.clone() else { continue };
        let candidate = PathBuf::from(&raw_path);
        if !candidate.exists() {
            continue;
        }
        match manager.wrap(&candidate, url_base).await {
            Ok(output_ref) => {
                if let Ok(json) = serde_json::to_value(&output_ref) {
                    if let Some(slot) = navigate_mut(result, &path) {
                        *slot = json;
                    }
                }
            }
            Err(err) => warn!(path = %raw_path, error = %err, "failed to wrap output file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn leaf(type_tag: SchemaType) -> SchemaNode {
        SchemaNode { type_tag, properties: BTreeMap::new(), required: Vec::new(), items: None, default: None }
    }

    #[tokio::test]
    async fn wraps_a_nested_file_field_in_place() {
        let source_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("out.png");
        tokio::fs::write(&source, b"fake-png").await.unwrap();

        let mut properties = BTreeMap::new();
        properties.insert("image".to_string(), leaf(SchemaType::File));
        let schema = SchemaNode { type_tag: SchemaType::Object, properties, required: vec![], items: None, default: None };

        let outputs_dir = tempfile::tempdir().unwrap();
        let manager = toolhost_filestore::OutputRefManager::new(outputs_dir.path());

        let mut result = serde_json::json!({ "image": source.to_str().unwrap() });
        wrap_file_fields(&mut result, &schema, &manager, "/v1/files").await;

        assert!(result["image"].is_object());
        assert!(result["image"]["url"].as_str().unwrap().starts_with("/v1/files/"));
    }

    #[tokio::test]
    async fn leaves_non_existent_paths_untouched() {
        let mut properties = BTreeMap::new();
        properties.insert("image".to_string(), leaf(SchemaType::File));
        let schema = SchemaNode { type_tag: SchemaType::Object, properties, required: vec![], items: None, default: None };

        let outputs_dir = tempfile::tempdir().unwrap();
        let manager = toolhost_filestore::OutputRefManager::new(outputs_dir.path());

        let mut result = serde_json::json!({ "image": "/no/such/file" });
        wrap_file_fields(&mut result, &schema, &manager, "/v1/files").await;

        assert_eq!(result["image"], serde_json::json!("/no/such/file"));
    }
}
