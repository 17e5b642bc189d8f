//! Purpose: Immutable schema tree for one Skiff row plus the multi-table `Format`.
//! Exports: `WireType`, `Schema`, `SchemaEntry`, `Format`, `TableLayout`, system column names.
//! Role: Directs the materializer; every byte on the wire is accounted for by a node here.
//! Invariants: A `Format` only exists fully resolved and validated; no lookups happen mid-stream.
//! Invariants: The system prefix is synthesized per table and never taken from caller schemas.
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

pub const KEY_SWITCH_COLUMN: &str = "$key_switch";
pub const ROW_INDEX_COLUMN: &str = "$row_index";
pub const RANGE_INDEX_COLUMN: &str = "$range_index";
pub const MAX_SCHEMA_DEPTH: usize = 64;

const SYSTEM_COLUMNS: [&str; 3] = [KEY_SWITCH_COLUMN, ROW_INDEX_COLUMN, RANGE_INDEX_COLUMN];
const REFERENCE_PREFIX: char = '$';

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireType {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Double,
    Boolean,
    String32,
    Yson32,
    Nothing,
    Tuple,
    Variant8,
    Variant16,
}

impl WireType {
    pub fn is_leaf(self) -> bool {
        !matches!(self, WireType::Tuple | WireType::Variant8 | WireType::Variant16)
    }

    /// Upper bound on alternatives addressable by the tag width.
    pub fn max_alternatives(self) -> Option<usize> {
        match self {
            WireType::Variant8 => Some(1 << 8),
            WireType::Variant16 => Some(1 << 16),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WireType::Int8 => "int8",
            WireType::Int16 => "int16",
            WireType::Int32 => "int32",
            WireType::Int64 => "int64",
            WireType::Uint8 => "uint8",
            WireType::Uint16 => "uint16",
            WireType::Uint32 => "uint32",
            WireType::Uint64 => "uint64",
            WireType::Double => "double",
            WireType::Boolean => "boolean",
            WireType::String32 => "string32",
            WireType::Yson32 => "yson32",
            WireType::Nothing => "nothing",
            WireType::Tuple => "tuple",
            WireType::Variant8 => "variant8",
            WireType::Variant16 => "variant16",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    wire_type: WireType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Schema>,
}

impl Schema {
    pub fn new(wire_type: WireType) -> Self {
        Self {
            wire_type,
            name: None,
            children: Vec::new(),
        }
    }

    pub fn tuple(children: Vec<Schema>) -> Self {
        Self::new(WireType::Tuple).with_children(children)
    }

    pub fn variant8(children: Vec<Schema>) -> Self {
        Self::new(WireType::Variant8).with_children(children)
    }

    pub fn variant16(children: Vec<Schema>) -> Self {
        Self::new(WireType::Variant16).with_children(children)
    }

    /// `Variant8[Nothing, inner]`: tag 0 is absent, tag 1 carries `inner`.
    pub fn optional(name: impl Into<String>, inner: Schema) -> Self {
        Self::variant8(vec![Schema::new(WireType::Nothing), inner]).named(name)
    }

    pub fn optional_column(name: impl Into<String>, wire_type: WireType) -> Self {
        Self::optional(name, Schema::new(wire_type))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn named_opt(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    fn with_children(mut self, children: Vec<Schema>) -> Self {
        self.children = children;
        self
    }

    pub fn wire_type(&self) -> WireType {
        self.wire_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn children(&self) -> &[Schema] {
        &self.children
    }

    /// Position and node of the named child of a tuple.
    pub fn child(&self, name: &str) -> Option<(usize, &Schema)> {
        if self.wire_type != WireType::Tuple {
            return None;
        }
        self.children
            .iter()
            .enumerate()
            .find(|(_, child)| child.name() == Some(name))
    }

    pub fn is_optional(&self) -> bool {
        self.wire_type == WireType::Variant8
            && self.children.len() == 2
            && self.children[0].wire_type == WireType::Nothing
    }

    fn same_shape(&self, other: &Schema) -> bool {
        self.wire_type == other.wire_type
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.same_shape(b))
    }
}

/// The three control columns that precede every row's data tuple.
pub fn system_prefix() -> [Schema; 3] {
    [
        Schema::new(WireType::Boolean).named(KEY_SWITCH_COLUMN),
        Schema::optional_column(ROW_INDEX_COLUMN, WireType::Int64),
        Schema::optional_column(RANGE_INDEX_COLUMN, WireType::Int64),
    ]
}

/// A table or registry entry: an inline schema or a `"$name"` registry reference.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaEntry {
    Reference(String),
    Schema(Schema),
}

impl From<Schema> for SchemaEntry {
    fn from(schema: Schema) -> Self {
        SchemaEntry::Schema(schema)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableLayout {
    prefix: [Schema; 3],
    data: Schema,
}

impl TableLayout {
    pub fn prefix(&self) -> &[Schema; 3] {
        &self.prefix
    }

    /// The caller-visible data tuple.
    pub fn data(&self) -> &Schema {
        &self.data
    }
}

#[derive(Debug, Deserialize)]
struct FormatDescriptor {
    name: String,
    table_skiff_schemas: Vec<SchemaEntry>,
    #[serde(default)]
    skiff_schema_registry: BTreeMap<String, SchemaEntry>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(try_from = "FormatDescriptor")]
pub struct Format {
    name: String,
    tables: Vec<TableLayout>,
}

impl Format {
    pub fn new(
        name: impl Into<String>,
        tables: Vec<SchemaEntry>,
        registry: BTreeMap<String, SchemaEntry>,
    ) -> Result<Self, Error> {
        if tables.len() > usize::from(u16::MAX) + 1 {
            return Err(schema_error("too many tables for a 2-byte table index"));
        }

        let mut resolved = BTreeMap::new();
        for name in registry.keys() {
            let schema = resolve_reference(name, &registry, &mut Vec::new())?;
            validate(&schema, 1).map_err(|err| {
                err.with_hint(format!("Fix registry entry {REFERENCE_PREFIX}{name}."))
            })?;
            resolved.insert(name.clone(), schema);
        }

        let mut layouts = Vec::with_capacity(tables.len());
        for (index, entry) in tables.into_iter().enumerate() {
            let schema = match entry {
                SchemaEntry::Schema(schema) => schema,
                SchemaEntry::Reference(reference) => {
                    let key = reference_key(&reference)?;
                    resolved
                        .get(key)
                        .cloned()
                        .ok_or_else(|| undefined_reference(&reference))?
                }
            };
            let layout = table_layout(schema)
                .map_err(|err| err.with_table_index(index as u16))?;
            layouts.push(layout);
        }

        Ok(Self {
            name: name.into(),
            tables: layouts,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Schema)
                .with_message(format!("invalid format descriptor: {err}"))
                .with_source(err)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tables(&self) -> &[TableLayout] {
        &self.tables
    }

    pub fn table(&self, index: u16) -> Option<&TableLayout> {
        self.tables.get(usize::from(index))
    }
}

impl TryFrom<FormatDescriptor> for Format {
    type Error = Error;

    fn try_from(descriptor: FormatDescriptor) -> Result<Self, Self::Error> {
        Format::new(
            descriptor.name,
            descriptor.table_skiff_schemas,
            descriptor.skiff_schema_registry,
        )
    }
}

fn resolve_reference(
    key: &str,
    registry: &BTreeMap<String, SchemaEntry>,
    stack: &mut Vec<String>,
) -> Result<Schema, Error> {
    if stack.iter().any(|seen| seen == key) {
        stack.push(key.to_string());
        return Err(schema_error(format!(
            "self-referential registry entry: {}",
            stack.join(" -> ")
        )));
    }
    let entry = registry
        .get(key)
        .ok_or_else(|| undefined_reference(&format!("{REFERENCE_PREFIX}{key}")))?;
    stack.push(key.to_string());
    let schema = match entry {
        SchemaEntry::Schema(schema) => schema.clone(),
        SchemaEntry::Reference(reference) => {
            let next = reference_key(reference)?;
            resolve_reference(next, registry, stack)?
        }
    };
    stack.pop();
    Ok(schema)
}

fn reference_key(reference: &str) -> Result<&str, Error> {
    reference
        .strip_prefix(REFERENCE_PREFIX)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            schema_error(format!("malformed registry reference {reference:?}"))
                .with_hint("References are written as \"$name\".")
        })
}

fn table_layout(schema: Schema) -> Result<TableLayout, Error> {
    if schema.wire_type != WireType::Tuple {
        return Err(schema_error(format!(
            "table schema must be a tuple, got {}",
            schema.wire_type.as_str()
        )));
    }
    validate(&schema, 1)?;

    let prefix = system_prefix();
    let mut children = schema.children;
    let spelled_out = children
        .first()
        .is_some_and(|child| child.name() == Some(KEY_SWITCH_COLUMN));
    if spelled_out {
        if children.len() < prefix.len() {
            return Err(system_column_error());
        }
        let matches = prefix.iter().zip(&children).all(|(expected, actual)| {
            expected.name() == actual.name() && expected.same_shape(actual)
        });
        if !matches {
            return Err(system_column_error());
        }
        children.drain(..prefix.len());
    }
    if let Some(stray) = children
        .iter()
        .find_map(|child| child.name().filter(|name| SYSTEM_COLUMNS.contains(name)))
    {
        return Err(schema_error(format!(
            "system column {stray} is only allowed in the leading prefix"
        )));
    }

    Ok(TableLayout {
        prefix,
        data: Schema::tuple(children).named_opt(schema.name),
    })
}

fn validate(node: &Schema, depth: usize) -> Result<(), Error> {
    if depth > MAX_SCHEMA_DEPTH {
        return Err(schema_error(format!(
            "schema nesting exceeds {MAX_SCHEMA_DEPTH} levels"
        )));
    }
    let label = node.name().unwrap_or("<unnamed>");
    match node.wire_type {
        wire_type if wire_type.is_leaf() => {
            if !node.children.is_empty() {
                return Err(schema_error(format!(
                    "{} node {label} must not have children",
                    wire_type.as_str()
                )));
            }
        }
        WireType::Tuple => {
            let mut seen = HashSet::new();
            for child in &node.children {
                if let Some(name) = child.name()
                    && !seen.insert(name)
                {
                    return Err(schema_error(format!(
                        "duplicate column {name} in tuple {label}"
                    )));
                }
            }
        }
        wire_type => {
            let max = wire_type.max_alternatives().unwrap_or(0);
            if node.children.is_empty() {
                return Err(schema_error(format!(
                    "{} node {label} has no alternatives",
                    wire_type.as_str()
                )));
            }
            if node.children.len() > max {
                return Err(schema_error(format!(
                    "{} node {label} has {} alternatives (max {max})",
                    wire_type.as_str(),
                    node.children.len()
                )));
            }
        }
    }
    node.children
        .iter()
        .try_for_each(|child| validate(child, depth + 1))
}

fn schema_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Schema).with_message(message)
}

fn undefined_reference(reference: &str) -> Error {
    schema_error(format!("undefined registry reference {reference}"))
        .with_hint("Add the name to skiff_schema_registry or inline the schema.")
}

fn system_column_error() -> Error {
    schema_error("leading system columns must be $key_switch, $row_index, $range_index")
        .with_hint("Use boolean, optional int64, optional int64, or omit them entirely.")
}
