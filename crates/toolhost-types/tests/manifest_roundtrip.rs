use std::path::PathBuf;

use toolhost_types::{Mode, SchemaType, ToolManifest, Transport};

#[test]
fn parses_manifest_and_walks_its_output_schema_for_file_fields() {
    let raw = r#"
name: image-resize
version: "0.3.0"
description: resize an image
runtime:
  language: python3.11
  transport: framed
  mode: persistent
rpc:
  resize:
    description: resize an uploaded image
    input_schema:
      type: object
      required: [image]
      properties:
        image: { type: file }
        width: { type: integer }
    output_schema:
      type: object
      properties:
        thumbnail: { type: file }
health:
  method: ping
"#;

    let manifest = ToolManifest::parse(raw, &PathBuf::from("tool.yaml")).expect("valid manifest");
    assert_eq!(manifest.runtime.mode, Mode::Persistent);
    assert_eq!(manifest.runtime.transport, Transport::Framed);

    let descriptor = manifest.rpc.get("resize").expect("resize method present");

    let mut file_outputs = Vec::new();
    let mut path = Vec::new();
    descriptor
        .output_schema
        .walk(&mut path, &mut |p, node| {
            if node.type_tag == SchemaType::File {
                file_outputs.push(p.to_vec());
            }
        });

    assert_eq!(file_outputs, vec![vec!["thumbnail".to_string()]]);

    let health = manifest.health.expect("health block present");
    assert_eq!(health.method, "ping");
    assert_eq!(health.interval_secs, 30);
    assert_eq!(health.failure_threshold, 3);
}
