//! Minimal tool arguments synthesized from a JSON Schema.

use serde_json::{Map, Value, json};

/// Build the smallest argument object satisfying `schema`'s required
/// properties: strings become `"test"`, numbers `0`, booleans `false`,
/// arrays `[]` and nested objects are filled recursively. `const`,
/// `default` and the first `enum` value take precedence over the type.
///
/// A missing or property-less schema yields `{}`.
pub fn minimal_args(schema: &Value) -> Value {
    let mut args = Map::new();
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Value::Object(args);
    };
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect::<Vec<_>>())
        .unwrap_or_default();

    for name in required {
        let property = properties.get(name).unwrap_or(&Value::Null);
        args.insert(name.to_owned(), minimal_value(property));
    }
    Value::Object(args)
}

fn minimal_value(schema: &Value) -> Value {
    for key in ["const", "default"] {
        if let Some(value) = schema.get(key) {
            return value.clone();
        }
    }
    if let Some(first) = schema
        .get("enum")
        .and_then(Value::as_array)
        .and_then(|values| values.first())
    {
        return first.clone();
    }

    match primary_type(schema) {
        Some("string") => json!("test"),
        Some("integer" | "number") => json!(0),
        Some("boolean") => json!(false),
        Some("array") => json!([]),
        Some("object") => minimal_args(schema),
        _ => ["anyOf", "oneOf"]
            .iter()
            .find_map(|k| schema.get(*k).and_then(Value::as_array)?.first())
            .map_or(Value::Null, minimal_value),
    }
}

/// The schema's `type`, or the first non-null entry of a type array.
fn primary_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(t) => Some(t.as_str()),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null"),
        _ => None,
    }
}
