//! Purpose: Define the stable public Rust API boundary for the Skiff decoder.
//! Exports: Schema model, format descriptor, decoder, scan capability, errors.
//! Role: Public, additive-only surface; hides internal module layout.
//! Invariants: This module is the only public path to decoding primitives.
//! Invariants: Internal modules remain private and are not directly exposed.

pub use crate::core::decoder::Decoder;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::options::{DEFAULT_MAX_STRING_LEN, DecoderOptions};
pub use crate::core::reader::StreamReader;
pub use crate::core::scan::{FromValue, ScanRow};
pub use crate::core::schema::{
    Format, KEY_SWITCH_COLUMN, MAX_SCHEMA_DEPTH, RANGE_INDEX_COLUMN, ROW_INDEX_COLUMN, Schema,
    SchemaEntry, TableLayout, WireType, system_prefix,
};
pub use crate::core::value::{RowRef, Value, materialize};
