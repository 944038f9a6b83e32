#![allow(clippy::unwrap_used, clippy::expect_used)]

use scholar_core::*;
use serde_json::json;

// ---------------------------------------------------------------------------
// 1. Message serialization roundtrip keeps part order
// ---------------------------------------------------------------------------

#[test]
fn message_serialization_keeps_part_order() {
    let args = json!({"topic": "graph neural networks", "max_results": 2});
    let msg = Message::model(vec![
        Part::text("Searching."),
        Part::function_call("search_papers", args.as_object().cloned().unwrap()),
    ]);

    let encoded = serde_json::to_string(&msg).unwrap();
    let decoded: Message = serde_json::from_str(&encoded).unwrap();

    assert_eq!(decoded.id, msg.id);
    assert_eq!(decoded.role, Role::Model);
    assert_eq!(decoded.parts, msg.parts);
    assert!(decoded.parts[1].is_function_call());
}

// ---------------------------------------------------------------------------
// 2. Error taxonomy display strings
// ---------------------------------------------------------------------------

#[test]
fn error_display_strings() {
    let err = ScholarError::ConnectionFailed {
        server: "research".into(),
        reason: "spawn failed".into(),
    };
    assert_eq!(err.to_string(), "Failed to connect to research server: spawn failed");

    let err = ScholarError::not_found(CapabilityKind::Tool, "fetch");
    assert_eq!(err.to_string(), "Tool 'fetch' not found");

    let err = ScholarError::GenerationFailed("quota exceeded".into());
    assert!(err.to_string().contains("quota exceeded"));
}

// ---------------------------------------------------------------------------
// 3. Tool declarations deserialize without a description
// ---------------------------------------------------------------------------

#[test]
fn tool_declaration_description_defaults() {
    let decl: ToolDeclaration = serde_json::from_value(json!({
        "name": "extract_info",
        "parameters": {"type": "object", "properties": {"paper_id": {"type": "string"}}}
    }))
    .unwrap();
    assert_eq!(decl.name, "extract_info");
    assert!(decl.description.is_empty());
    assert_eq!(decl.parameters["properties"]["paper_id"]["type"], "string");
}
