//! Tests for guided parameter collection driven by tool schemas

use mcprobe::collect::input::InputSession;
use mcprobe::collect::{collect_guided, CollectError};
use mcprobe::core::classify::ErrorCategory;
use mcprobe::core::schema::SchemaNode;
use mcprobe::core::ParameterSet;
use serde_json::{json, Value as JsonValue};

fn collect(schema: JsonValue, script: &str) -> (Result<ParameterSet, CollectError>, String) {
    let node = SchemaNode::interpret(&schema);
    let mut input = InputSession::scripted(script);
    let mut out = Vec::new();
    let result = collect_guided(&node, &mut input, &mut out);
    (result, String::from_utf8(out).unwrap())
}

fn search_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string", "description": "Search text"},
            "limit": {"type": "integer", "default": 10},
            "tags": {"type": "array"},
            "exact": {"type": "boolean"},
            "filters": {"type": "object"},
            "order": {"type": "string", "enum": ["asc", "desc"]}
        },
        "required": ["query"]
    })
}

#[test]
fn test_every_type_is_coerced() {
    let script = "rust async\n7.9\nweb, cli ,\nyes\n{\"lang\": \"en\"}\ndesc\n";
    let (result, output) = collect(search_schema(), script);

    let params = result.unwrap();
    assert_eq!(params["query"], json!("rust async"));
    assert_eq!(params["limit"], json!(7));
    assert_eq!(params["tags"], json!(["web", "cli", ""]));
    assert_eq!(params["exact"], json!(true));
    assert_eq!(params["filters"], json!({"lang": "en"}));
    assert_eq!(params["order"], json!("desc"));

    assert!(output.contains("Schema indicates required parameters: query"));
    assert!(output.contains("query (Search text) [required] (type: string): "));
    assert!(output.contains("    Default: 10"));
    assert!(output.contains("    Allowed values: \"asc\", \"desc\""));
    assert!(output.contains("(comma-separated)"));
    assert!(output.contains("📋 Parameter summary:"));
}

#[test]
fn test_optional_fields_can_be_skipped() {
    let (result, output) = collect(search_schema(), "rust\n\n\n\n\n\n");

    let params = result.unwrap();
    assert_eq!(params.len(), 1);
    assert!(!params.contains_key("limit"));
    assert_eq!(output.matches("✓ Skipped (optional)").count(), 5);
}

#[test]
fn test_properties_keep_declaration_order() {
    let (result, _) = collect(search_schema(), "q\n1\n[\"a\"]\nno\n\nasc\n");
    let params = result.unwrap();
    let keys: Vec<&str> = params.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["query", "limit", "tags", "exact", "order"]);
    assert_eq!(params["tags"], json!(["a"]));
    assert_eq!(params["exact"], json!(false));
}

#[test]
fn test_required_gets_one_second_chance() {
    let (result, output) = collect(search_schema(), "\nfound it\n\n\n\n\n\n");
    assert_eq!(result.unwrap()["query"], json!("found it"));
    assert_eq!(
        output
            .matches("This parameter is required. Please enter a value.")
            .count(),
        1
    );
}

#[test]
fn test_required_missing_aborts_whole_collection() {
    let (result, _) = collect(search_schema(), "\n\n");
    let err = result.unwrap_err();
    assert!(matches!(err, CollectError::RequiredMissing(ref name) if name == "query"));
    assert_eq!(
        err.category(),
        ErrorCategory::ParameterValidationRequiredMissing
    );
}

#[test]
fn test_bad_number_aborts_without_partial_set() {
    let (result, _) = collect(search_schema(), "rust\nlots\n");
    let err = result.unwrap_err();
    assert!(matches!(err, CollectError::InvalidNumber { .. }));
    assert_eq!(err.classified().category, ErrorCategory::ParameterValidation);
}

#[test]
fn test_malformed_object_is_rejected() {
    let (result, _) = collect(search_schema(), "rust\n\n\n\n{lang: en}\n");
    assert!(matches!(
        result,
        Err(CollectError::InvalidObject { ref name, .. }) if name == "filters"
    ));
}

#[test]
fn test_input_closed_mid_collection() {
    let (result, _) = collect(search_schema(), "rust\n5\n");
    assert!(matches!(result, Err(CollectError::InputClosed)));
}

#[test]
fn test_schema_without_properties_takes_json() {
    let script = "{\"path\": \"/tmp\", \"depth\": 2}\n";
    let (result, output) = collect(json!({"type": "object"}), script);
    let params = result.unwrap();
    assert_eq!(params["path"], json!("/tmp"));
    assert_eq!(params["depth"], json!(2));
    assert!(output.contains("Enter parameters as JSON"));

    let (result, output) = collect(json!({}), "\n");
    assert!(result.unwrap().is_empty());
    assert!(output.contains("📋 No parameters provided"));

    let (result, _) = collect(json!({"type": "object"}), "[1]\n");
    assert!(matches!(result, Err(CollectError::InvalidJson { .. })));
}

#[test]
fn test_numeric_enum_accepts_equal_values() {
    let schema = json!({
        "type": "object",
        "properties": {"level": {"type": "number", "enum": [1, 2, 3]}}
    });
    let (result, _) = collect(schema.clone(), "2\n");
    assert_eq!(result.unwrap()["level"].as_f64(), Some(2.0));

    let (result, _) = collect(schema, "4\n");
    assert!(matches!(result, Err(CollectError::NotInEnum { .. })));
}
