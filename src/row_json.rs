//! Purpose: JSON renderings of decoded rows and resolved formats for CLI output.
//! Exports: `row_json`, `value_json`, `format_json`.
//! Role: Keep the decode/check output envelopes consistent and in one place.
//! Invariants: Stable key names for row envelopes; optional columns render as value-or-null.
//! Invariants: Non-UTF-8 strings and YSON payloads are rendered lossily, never dropped.

use std::io::Read;

use bstr::ByteSlice;
use serde_json::{Map, Value, json};
use skiff::api::{Decoder, Format, Schema, Value as SkiffValue, WireType};

pub(crate) fn row_json<R: Read>(decoder: &Decoder<R>) -> Value {
    let mut map = Map::new();
    map.insert("table_index".to_string(), json!(decoder.table_index()));
    map.insert("key_switch".to_string(), json!(decoder.key_switch()));
    map.insert("row_index".to_string(), json!(decoder.row_index()));
    map.insert("range_index".to_string(), json!(decoder.range_index()));
    let row = decoder
        .row()
        .map(|row| tuple_json(row.schema(), row.values()))
        .unwrap_or(Value::Null);
    map.insert("row".to_string(), row);
    Value::Object(map)
}

pub(crate) fn value_json(schema: &Schema, value: &SkiffValue) -> Value {
    match value {
        SkiffValue::Nothing => Value::Null,
        SkiffValue::Int8(v) => json!(v),
        SkiffValue::Int16(v) => json!(v),
        SkiffValue::Int32(v) => json!(v),
        SkiffValue::Int64(v) => json!(v),
        SkiffValue::Uint8(v) => json!(v),
        SkiffValue::Uint16(v) => json!(v),
        SkiffValue::Uint32(v) => json!(v),
        SkiffValue::Uint64(v) => json!(v),
        SkiffValue::Double(v) => serde_json::Number::from_f64(*v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SkiffValue::Boolean(v) => json!(v),
        SkiffValue::String(bytes) => json!(bytes.to_str_lossy()),
        SkiffValue::Yson(bytes) => json!({ "$yson": bytes.to_str_lossy() }),
        SkiffValue::Tuple(values) => tuple_json(schema, values),
        SkiffValue::Variant { tag, value } => {
            let child = schema.children().get(usize::from(*tag));
            let inner = match child {
                Some(child) => value_json(child, value),
                None => Value::Null,
            };
            if schema.is_optional() {
                inner
            } else {
                json!([tag, inner])
            }
        }
    }
}

// Tuples whose children are all named render as objects, otherwise as arrays.
fn tuple_json(schema: &Schema, values: &[SkiffValue]) -> Value {
    let children = schema.children();
    let all_named = children.iter().all(|child| child.name().is_some());
    if all_named && schema.wire_type() == WireType::Tuple {
        let mut map = Map::new();
        for (child, value) in children.iter().zip(values) {
            if let Some(name) = child.name() {
                map.insert(name.to_string(), value_json(child, value));
            }
        }
        return Value::Object(map);
    }
    Value::Array(
        children
            .iter()
            .zip(values)
            .map(|(child, value)| value_json(child, value))
            .collect(),
    )
}

pub(crate) fn format_json(format: &Format) -> Value {
    let tables = format
        .tables()
        .iter()
        .enumerate()
        .map(|(index, layout)| {
            let columns = layout
                .data()
                .children()
                .iter()
                .map(|child| {
                    json!({
                        "name": child.name(),
                        "wire_type": child.wire_type().as_str(),
                        "optional": child.is_optional(),
                    })
                })
                .collect::<Vec<_>>();
            json!({
                "table_index": index,
                "columns": columns,
                "schema": serde_json::to_value(layout.data()).unwrap_or(Value::Null),
            })
        })
        .collect::<Vec<_>>();
    json!({ "name": format.name(), "tables": tables })
}
