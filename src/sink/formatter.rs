//! Record Formatter
//!
//! Turns one record into one line of output text. Structured values become
//! a minimal JSON rendering; everything else keeps its native textual form.
//!
//! Known limitations:
//! - Only double quotes are escaped inside strings. Control characters and
//!   backslashes pass through unchanged, so such lines are not strict JSON.
//! - Map keys are written verbatim, without escaping.
//! - Map entries are written in insertion order.
//! - Integral floats are written with a `.0` suffix (`30.0`). Non-finite
//!   floats are written as `NaN` or `inf`, which is not valid JSON.

use crate::sink::record::{SchemaType, SinkRecord, Value};

/// Format a record's value as a single line (without terminator)
pub fn format_record(record: &SinkRecord) -> String {
    let value = &record.value;
    if value.is_null() {
        return "null".to_string();
    }

    let schema = match &record.schema {
        Some(schema) => schema,
        None => return value.to_string(),
    };

    match (schema.schema_type, value) {
        (SchemaType::Struct, Value::Struct(s)) => {
            let mut out = String::from("{");
            for (i, field) in schema.fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_key(&mut out, &field.name);
                write_json(&mut out, s.get(&field.name).unwrap_or(&Value::Null));
            }
            out.push('}');
            out
        }
        (SchemaType::Map, Value::Map(_)) | (SchemaType::Array, Value::Array(_)) => to_json(value),
        _ => value.to_string(),
    }
}

/// Render a value as minimal JSON
pub fn to_json(value: &Value) -> String {
    let mut out = String::new();
    write_json(&mut out, value);
    out
}

fn write_json(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Map(entries) => write_object(out, entries),
        // Nested structs carry no schema of their own; fields are written
        // in the order they were put.
        Value::Struct(s) => write_object(out, s.entries()),
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json(out, v);
            }
            out.push(']');
        }
        Value::String(s) => {
            out.push('"');
            out.push_str(&s.replace('"', "\\\""));
            out.push('"');
        }
        other => out.push_str(&other.to_string()),
    }
}

fn write_object(out: &mut String, entries: &[(String, Value)]) {
    out.push('{');
    for (i, (k, v)) in entries.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_key(out, k);
        write_json(out, v);
    }
    out.push('}');
}

fn write_key(out: &mut String, key: &str) {
    out.push('"');
    out.push_str(key);
    out.push_str("\":");
}
