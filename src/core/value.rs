//! Purpose: Decoded value tree and the recursive schema-directed materializer.
//! Exports: `Value`, `RowRef`, `materialize`.
//! Role: Turns bytes into values one schema node at a time; owns no cross-row state.
//! Invariants: A node either yields a complete value or an error; never a partial tree.
//! Invariants: Unselected variant alternatives and tuple framing consume zero bytes.
use std::io::Read;

use crate::core::error::{Error, ErrorKind};
use crate::core::options::DecoderOptions;
use crate::core::reader::StreamReader;
use crate::core::schema::{Schema, WireType};

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nothing,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Double(f64),
    Boolean(bool),
    String(Vec<u8>),
    /// Opaque YSON payload; interpreting it is left to the caller.
    Yson(Vec<u8>),
    Tuple(Vec<Value>),
    Variant { tag: u16, value: Box<Value> },
}

impl Value {
    /// Unwraps optional/variant layers; `None` when the innermost value is `Nothing`.
    pub fn present(&self) -> Option<&Value> {
        match self {
            Value::Nothing => None,
            Value::Variant { value, .. } => value.present(),
            other => Some(other),
        }
    }

    pub fn is_null(&self) -> bool {
        self.present().is_none()
    }

    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Value::Int8(v) => Some(v.into()),
            Value::Int16(v) => Some(v.into()),
            Value::Int32(v) => Some(v.into()),
            Value::Int64(v) => Some(v.into()),
            Value::Uint8(v) => Some(v.into()),
            Value::Uint16(v) => Some(v.into()),
            Value::Uint32(v) => Some(v.into()),
            Value::Uint64(v) => Some(v.into()),
            _ => None,
        }
    }

    /// Short name of the runtime shape, used in scan diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Nothing => "nothing",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Uint8(_) => "uint8",
            Value::Uint16(_) => "uint16",
            Value::Uint32(_) => "uint32",
            Value::Uint64(_) => "uint64",
            Value::Double(_) => "double",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string32",
            Value::Yson(_) => "yson32",
            Value::Tuple(_) => "tuple",
            Value::Variant { .. } => "variant",
        }
    }
}

/// Name-indexed view over a decoded tuple and the schema that produced it.
#[derive(Clone, Copy, Debug)]
pub struct RowRef<'a> {
    schema: &'a Schema,
    values: &'a [Value],
}

impl<'a> RowRef<'a> {
    pub(crate) fn new(schema: &'a Schema, values: &'a [Value]) -> Self {
        Self { schema, values }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    pub fn get(&self, name: &str) -> Option<&'a Value> {
        let (position, _) = self.schema.child(name)?;
        self.values.get(position)
    }

    /// Named columns in schema order; unnamed children are positional only.
    pub fn columns(self) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.schema
            .children()
            .iter()
            .zip(self.values)
            .filter_map(|(node, value)| node.name().map(|name| (name, value)))
    }
}

pub fn materialize<R: Read>(
    node: &Schema,
    reader: &mut StreamReader<R>,
    options: &DecoderOptions,
) -> Result<Value, Error> {
    let value = match node.wire_type() {
        WireType::Int8 => reader.read_i8().map(Value::Int8),
        WireType::Int16 => reader.read_i16().map(Value::Int16),
        WireType::Int32 => reader.read_i32().map(Value::Int32),
        WireType::Int64 => reader.read_i64().map(Value::Int64),
        WireType::Uint8 => reader.read_u8().map(Value::Uint8),
        WireType::Uint16 => reader.read_u16().map(Value::Uint16),
        WireType::Uint32 => reader.read_u32().map(Value::Uint32),
        WireType::Uint64 => reader.read_u64().map(Value::Uint64),
        WireType::Double => reader.read_f64().map(Value::Double),
        WireType::Boolean => reader.read_bool(options.strict_booleans).map(Value::Boolean),
        WireType::String32 => reader
            .read_length_prefixed(options.max_string_len)
            .map(Value::String),
        WireType::Yson32 => reader
            .read_length_prefixed(options.max_string_len)
            .map(Value::Yson),
        WireType::Nothing => Ok(Value::Nothing),
        WireType::Tuple => node
            .children()
            .iter()
            .map(|child| materialize(child, reader, options))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Tuple),
        WireType::Variant8 | WireType::Variant16 => materialize_variant(node, reader, options),
    };
    match node.name() {
        Some(name) => value.map_err(|err| err.with_column(name)),
        None => value,
    }
}

fn materialize_variant<R: Read>(
    node: &Schema,
    reader: &mut StreamReader<R>,
    options: &DecoderOptions,
) -> Result<Value, Error> {
    let tag_offset = reader.offset();
    let tag = if node.wire_type() == WireType::Variant8 {
        u16::from(reader.read_u8()?)
    } else {
        reader.read_u16()?
    };
    let Some(child) = node.children().get(usize::from(tag)) else {
        return Err(Error::new(ErrorKind::Decode)
            .with_message(format!(
                "variant tag {tag} out of range ({} alternatives)",
                node.children().len()
            ))
            .with_offset(tag_offset));
    };
    let value = materialize(child, reader, options)?;
    Ok(Value::Variant {
        tag,
        value: Box::new(value),
    })
}

#[cfg(test)]
mod tests {
    use super::{RowRef, Value, materialize};
    use crate::core::error::ErrorKind;
    use crate::core::options::DecoderOptions;
    use crate::core::reader::StreamReader;
    use crate::core::schema::{Schema, WireType};

    fn decode(node: &Schema, bytes: &[u8]) -> (Result<Value, crate::core::error::Error>, u64) {
        let mut reader = StreamReader::new(bytes);
        let result = materialize(node, &mut reader, &DecoderOptions::default());
        (result, reader.offset())
    }

    #[test]
    fn fixed_scalars_use_declared_width() {
        let cases = [
            (WireType::Int8, vec![0xff], Value::Int8(-1)),
            (WireType::Uint16, vec![0x01, 0x02], Value::Uint16(0x0201)),
            (WireType::Int32, (-5i32).to_le_bytes().to_vec(), Value::Int32(-5)),
            (WireType::Uint64, u64::MAX.to_le_bytes().to_vec(), Value::Uint64(u64::MAX)),
            (WireType::Double, 1.5f64.to_le_bytes().to_vec(), Value::Double(1.5)),
            (WireType::Boolean, vec![1], Value::Boolean(true)),
        ];
        for (wire_type, bytes, expected) in cases {
            let (value, consumed) = decode(&Schema::new(wire_type), &bytes);
            assert_eq!(value.expect("value"), expected);
            assert_eq!(consumed as usize, bytes.len());
        }
    }

    #[test]
    fn optional_absent_consumes_one_byte() {
        let node = Schema::optional_column("x", WireType::Int64);
        let (value, consumed) = decode(&node, &[0x00, 0xaa]);
        let value = value.expect("absent");
        assert!(value.is_null());
        assert_eq!(consumed, 1);
    }

    #[test]
    fn optional_present_consumes_tag_and_payload() {
        let node = Schema::optional_column("x", WireType::Int64);
        let mut bytes = vec![0x01];
        bytes.extend_from_slice(&9i64.to_le_bytes());
        let (value, consumed) = decode(&node, &bytes);
        assert_eq!(value.expect("present").present(), Some(&Value::Int64(9)));
        assert_eq!(consumed, 9);
    }

    #[test]
    fn optional_rejects_tags_beyond_one() {
        let node = Schema::optional_column("x", WireType::Int64);
        let (value, _) = decode(&node, &[0x02]);
        let err = value.expect_err("bad tag");
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.column(), Some("x"));
    }

    #[test]
    fn variant16_selects_single_alternative() {
        let node = Schema::variant16(vec![
            Schema::new(WireType::Int8),
            Schema::new(WireType::String32),
        ]);
        let mut bytes = vec![0x01, 0x00];
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(b"hi");
        let (value, consumed) = decode(&node, &bytes);
        assert_eq!(
            value.expect("variant"),
            Value::Variant {
                tag: 1,
                value: Box::new(Value::String(b"hi".to_vec()))
            }
        );
        assert_eq!(consumed, 8);

        let (value, _) = decode(&node, &[0x02, 0x00]);
        assert_eq!(value.expect_err("range").kind(), ErrorKind::Decode);
    }

    #[test]
    fn tuple_children_are_back_to_back() {
        let node = Schema::tuple(vec![
            Schema::new(WireType::Uint8).named("a"),
            Schema::new(WireType::Nothing).named("b"),
            Schema::new(WireType::Yson32).named("c"),
        ]);
        let mut bytes = vec![0x07];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(b'#');
        let (value, consumed) = decode(&node, &bytes);
        assert_eq!(
            value.expect("tuple"),
            Value::Tuple(vec![Value::Uint8(7), Value::Nothing, Value::Yson(b"#".to_vec())])
        );
        assert_eq!(consumed, 6);
    }

    #[test]
    fn truncated_string_is_fatal() {
        let node = Schema::new(WireType::String32).named("third");
        let mut bytes = 8u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"abb");
        let (value, _) = decode(&node, &bytes);
        let err = value.expect_err("truncated");
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.column(), Some("third"));
    }

    #[test]
    fn row_ref_looks_up_named_columns() {
        let schema = Schema::tuple(vec![
            Schema::new(WireType::Int8).named("a"),
            Schema::new(WireType::Int8),
            Schema::new(WireType::Int8).named("c"),
        ]);
        let values = [Value::Int8(1), Value::Int8(2), Value::Int8(3)];
        let row = RowRef::new(&schema, &values);
        assert_eq!(row.get("c"), Some(&Value::Int8(3)));
        assert_eq!(row.get("b"), None);
        let names: Vec<_> = row.columns().map(|(name, _)| name).collect();
        assert_eq!(names, ["a", "c"]);
    }
}
