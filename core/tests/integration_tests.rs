//! End-to-end behaviour of compiled schemas.

use serde_json::{Value, json};
use stream_schema_core::{CompileOptions, CompiledSchema, SchemaError, events};

fn compile(schema: Value) -> CompiledSchema {
    CompiledSchema::build(schema).expect("schema should compile")
}

#[test]
fn test_validation_is_deterministic() {
    let schema = compile(json!({"anyOf": [{"type": "string"}, {"minimum": 3}]}));
    for instance in [json!("a"), json!(2), json!(3), json!([1])] {
        let first = schema.validate(&instance);
        for _ in 0..3 {
            assert_eq!(schema.validate(&instance), first);
        }
    }
}

#[test]
fn test_integer_range() {
    let schema = compile(json!({"type": "integer", "minimum": 0, "maximum": 10}));
    assert!(schema.validate(&json!(0)));
    assert!(schema.validate(&json!(10)));
    assert!(!schema.validate(&json!(-1)));
    assert!(!schema.validate(&json!(11)));
    assert!(!schema.validate(&json!(5.5)));
    assert!(!schema.validate(&json!("5")));
}

#[test]
fn test_enum_with_array_entry() {
    let schema = compile(json!({"enum": [1, "a", [1, 2]]}));
    assert!(schema.validate(&json!([1, 2])));
    assert!(schema.validate(&json!("a")));
    assert!(!schema.validate(&json!([2, 1])));
    assert!(!schema.validate(&json!([1, 2, 3])));
}

#[test]
fn test_unique_numeric_items() {
    let schema = compile(json!({
        "type": "array",
        "items": {"type": "number"},
        "uniqueItems": true
    }));
    assert!(schema.validate(&json!([1, 2, 3])));
    assert!(!schema.validate(&json!([1, 2, 2])));
    assert!(!schema.validate(&json!([1, "2"])));
}

#[test]
fn test_required_typed_property() {
    let schema = compile(json!({
        "type": "object",
        "required": ["a"],
        "properties": {"a": {"type": "string"}}
    }));
    assert!(schema.validate(&json!({"a": "x", "b": 1})));
    assert!(!schema.validate(&json!({"b": 1})));
    assert!(!schema.validate(&json!({"a": 1})));
}

#[test]
fn test_shared_references_compile_to_one_node() {
    let schema = compile(json!({
        "definitions": {"x": {"type": "integer"}},
        "properties": {
            "a": {"$ref": "#/definitions/x"},
            "b": {"$ref": "#/definitions/x"}
        }
    }));
    let root = schema.node(schema.root());
    assert_eq!(root.property("a"), root.property("b"));
    assert_eq!(root.property("a"), schema.handle_at("/definitions/x"));
    assert_eq!(schema.len(), 2);
}

#[test]
fn test_root_self_reference_is_rejected() {
    let err = CompiledSchema::build(json!({"$ref": "#"})).unwrap_err();
    assert!(matches!(err, SchemaError::SelfReference { .. }));
    assert!(err.to_string().contains("self reference"));
}

#[test]
fn test_one_of_rejects_multiple_matches() {
    let schema = compile(json!({"oneOf": [{"type": "number"}, {"multipleOf": 1}]}));
    assert!(!schema.validate(&json!(4)));
    assert!(schema.validate(&json!(4.5)));
    // Only the multipleOf branch applies to a string.
    assert!(schema.validate(&json!("s")));
}

#[test]
fn test_additional_properties_false() {
    let schema = compile(json!({"properties": {"a": {}}, "additionalProperties": false}));
    assert!(!schema.validate(&json!({"a": 1, "b": 2})));
    assert!(schema.validate(&json!({"a": 1})));
}

#[test]
fn test_recursive_tree_schema() {
    let schema = compile(json!({
        "definitions": {
            "node": {
                "type": "object",
                "required": ["value"],
                "properties": {
                    "value": {"type": "integer"},
                    "children": {"type": "array", "items": {"$ref": "#/definitions/node"}}
                }
            }
        },
        "$schema": "http://json-schema.org/draft-04/schema#",
        "allOf": [{"$ref": "#/definitions/node"}]
    }));
    assert!(schema.validate(&json!({
        "value": 1,
        "children": [{"value": 2}, {"value": 3, "children": [{"value": 4}]}]
    })));
    assert!(!schema.validate(&json!({
        "value": 1,
        "children": [{"value": 2}, {"children": []}]
    })));
}

#[test]
fn test_streamed_and_in_memory_validation_agree() {
    let schema = compile(json!({
        "type": "object",
        "properties": {
            "tags": {"type": "array", "items": {"type": "string"}, "maxItems": 3},
            "when": {"type": "string", "format": "date-time"}
        },
        "dependencies": {"when": ["tags"]}
    }));
    let instances = [
        r#"{"tags": ["a"], "when": "2024-01-31T10:00:00Z"}"#,
        r#"{"when": "2024-01-31T10:00:00Z"}"#,
        r#"{"tags": ["a", "b", "c", "d"]}"#,
        r#"{"tags": ["a"], "when": "2024-02-30T10:00:00Z"}"#,
    ];
    for text in instances {
        let value: Value = serde_json::from_str(text).unwrap();
        assert_eq!(
            schema.validate_str(text).unwrap(),
            schema.validate(&value),
            "{text}"
        );
    }
}

#[test]
fn test_format_enforcement_is_optional() {
    let schema = json!({"format": "email"});
    let strict = CompiledSchema::build(schema.clone()).unwrap();
    let lenient = CompiledSchema::build_with(
        schema,
        &CompileOptions {
            validate_formats: false,
        },
    )
    .unwrap();
    assert!(!strict.validate(&json!("not an email")));
    assert!(lenient.validate(&json!("not an email")));
}

#[test]
fn test_yaml_instances_stream_into_sessions() {
    let schema = compile(json!({
        "type": "object",
        "required": ["name"],
        "properties": {"name": {"type": "string"}, "ports": {"items": {"type": "integer"}}}
    }));
    let mut session = schema.consumer();
    let yaml = serde_yaml::Deserializer::from_str("name: web\nports:\n  - 80\n  - 443\n");
    events::from_deserializer(yaml, &mut session).unwrap();
    assert!(session.finalize());
}

#[test]
fn test_compiled_schema_is_shared_across_threads() {
    let schema = compile(json!({"type": "array", "items": {"type": "integer"}}));
    std::thread::scope(|scope| {
        for n in 0..4 {
            let schema = &schema;
            scope.spawn(move || {
                assert!(schema.validate(&json!([n, n + 1])));
                assert!(!schema.validate(&json!([n, "x"])));
            });
        }
    });
}
