//! Purpose: Stateful row iterator over a multiplexed Skiff stream.
//! Exports: `Decoder`.
//! Role: Reads table index, system prefix and data tuple per row; applies counter persistence.
//! Invariants: A row becomes visible only after every byte of it decoded successfully.
//! Invariants: Stream/decode failures are terminal; there are no frame markers to resync on.
//! Invariants: Per-table counters belong to one decoder instance and are never shared.
use std::collections::HashMap;
use std::io::Read;

use tracing::{debug, trace, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::options::DecoderOptions;
use crate::core::reader::StreamReader;
use crate::core::scan::ScanRow;
use crate::core::schema::Format;
use crate::core::value::{RowRef, Value, materialize};

#[derive(Debug)]
enum State {
    Ready,
    RowOpen(OpenRow),
    Exhausted,
    Failed(Error),
}

#[derive(Debug)]
struct OpenRow {
    table_index: u16,
    key_switch: bool,
    row_index: Option<i64>,
    range_index: Option<i64>,
    values: Vec<Value>,
}

/// Counters carried across rows of one table. `None` until the stream sets them.
#[derive(Clone, Copy, Debug, Default)]
struct TableState {
    last_row_index: Option<i64>,
    last_range_index: Option<i64>,
}

#[derive(Debug)]
pub struct Decoder<R> {
    reader: StreamReader<R>,
    format: Format,
    options: DecoderOptions,
    tables: HashMap<u16, TableState>,
    state: State,
    rows_read: u64,
}

impl<R: Read> Decoder<R> {
    pub fn new(source: R, format: Format) -> Self {
        Self::with_options(source, format, DecoderOptions::default())
    }

    pub fn with_options(source: R, format: Format, options: DecoderOptions) -> Self {
        Self {
            reader: StreamReader::new(source),
            format,
            options,
            tables: HashMap::new(),
            state: State::Ready,
            rows_read: 0,
        }
    }

    /// Advances to the next row. Returns `false` at clean end of input or on
    /// failure; `err()` tells the two apart.
    pub fn next(&mut self) -> bool {
        if matches!(self.state, State::Exhausted | State::Failed(_)) {
            return false;
        }
        self.state = State::Ready;

        let ordinal = self.rows_read + 1;
        match self.read_row() {
            Ok(Some(row)) => {
                trace!(
                    row = ordinal,
                    table_index = row.table_index,
                    row_index = ?row.row_index,
                    range_index = ?row.range_index,
                    "decoded row"
                );
                self.rows_read = ordinal;
                self.state = State::RowOpen(row);
                true
            }
            Ok(None) => {
                debug!(rows = self.rows_read, bytes = self.reader.offset(), "stream exhausted");
                self.state = State::Exhausted;
                false
            }
            Err(err) => {
                let err = err.with_row(ordinal);
                warn!(error = %err, "skiff decoder failed");
                self.state = State::Failed(err);
                false
            }
        }
    }

    fn read_row(&mut self) -> Result<Option<OpenRow>, Error> {
        let Some(table_index) = self.reader.read_row_start()? else {
            return Ok(None);
        };
        self.decode_row(table_index)
            .map(Some)
            .map_err(|err| err.with_table_index(table_index))
    }

    fn decode_row(&mut self, table_index: u16) -> Result<OpenRow, Error> {
        let table_offset = self.reader.offset() - 2;
        let Some(layout) = self.format.table(table_index) else {
            return Err(Error::new(ErrorKind::Decode)
                .with_message(format!(
                    "table index {table_index} out of range ({} tables)",
                    self.format.tables().len()
                ))
                .with_offset(table_offset));
        };

        let [key_switch_node, row_index_node, range_index_node] = layout.prefix();
        let key_switch = match materialize(key_switch_node, &mut self.reader, &self.options)? {
            Value::Boolean(value) => value,
            other => return Err(prefix_error(&other)),
        };
        let explicit_row_index = system_index(materialize(
            row_index_node,
            &mut self.reader,
            &self.options,
        )?)?;
        let explicit_range_index = system_index(materialize(
            range_index_node,
            &mut self.reader,
            &self.options,
        )?)?;

        let values = match materialize(layout.data(), &mut self.reader, &self.options)? {
            Value::Tuple(values) => values,
            other => return Err(prefix_error(&other)),
        };

        let previous = self.tables.get(&table_index).copied().unwrap_or_else(|| {
            debug!(table_index, "first row for table");
            TableState::default()
        });
        let row_index = match explicit_row_index {
            Some(value) => Some(value),
            None => previous
                .last_row_index
                .map(|last| {
                    last.checked_add(1).ok_or_else(|| {
                        Error::new(ErrorKind::Decode)
                            .with_message("row index overflow")
                            .with_offset(table_offset)
                    })
                })
                .transpose()?,
        };
        let range_index = explicit_range_index.or(previous.last_range_index);
        self.tables.insert(
            table_index,
            TableState {
                last_row_index: row_index,
                last_range_index: range_index,
            },
        );

        Ok(OpenRow {
            table_index,
            key_switch,
            row_index,
            range_index,
            values,
        })
    }

    /// Consumes the decoder, yielding the number of rows read or the terminal error.
    pub fn finish(self) -> Result<u64, Error> {
        match self.state {
            State::Failed(err) => Err(err),
            _ => Ok(self.rows_read),
        }
    }

    pub fn err(&self) -> Option<&Error> {
        match &self.state {
            State::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Copies the current row's named columns into `dest`.
    ///
    /// A conversion failure is local to this call: the row stays open and may
    /// be scanned again into a different destination.
    pub fn scan<T: ScanRow + ?Sized>(&self, dest: &mut T) -> Result<(), Error> {
        match &self.state {
            State::RowOpen(row) => {
                let data = self.row_ref(row).ok_or_else(|| {
                    Error::new(ErrorKind::Usage).with_message("open row has no table layout")
                })?;
                dest.scan_row(data).map_err(|err| {
                    err.with_table_index(row.table_index).with_row(self.rows_read)
                })
            }
            State::Failed(err) => Err(err.detached()),
            State::Ready => Err(Error::new(ErrorKind::Usage)
                .with_message("scan called before next")
                .with_hint("Call next() and check that it returned true.")),
            State::Exhausted => {
                Err(Error::new(ErrorKind::Usage).with_message("scan called after end of stream"))
            }
        }
    }

    fn row_ref<'a>(&'a self, row: &'a OpenRow) -> Option<RowRef<'a>> {
        self.format
            .table(row.table_index)
            .map(|layout| RowRef::new(layout.data(), &row.values))
    }

    /// Name-indexed view of the current data tuple.
    pub fn row(&self) -> Option<RowRef<'_>> {
        self.open_row().and_then(|row| self.row_ref(row))
    }

    pub fn is_row_open(&self) -> bool {
        self.open_row().is_some()
    }

    /// Table of the current row; 0 when no row is open.
    pub fn table_index(&self) -> u16 {
        self.open_row().map_or(0, |row| row.table_index)
    }

    /// Key-switch flag of the current row; `false` when no row is open.
    pub fn key_switch(&self) -> bool {
        self.open_row().is_some_and(|row| row.key_switch)
    }

    /// Effective row index, or `None` if no row is open or the table has not
    /// yet carried an explicit value.
    pub fn row_index(&self) -> Option<i64> {
        self.open_row().and_then(|row| row.row_index)
    }

    pub fn range_index(&self) -> Option<i64> {
        self.open_row().and_then(|row| row.range_index)
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn bytes_read(&self) -> u64 {
        self.reader.offset()
    }

    fn open_row(&self) -> Option<&OpenRow> {
        match &self.state {
            State::RowOpen(row) => Some(row),
            _ => None,
        }
    }
}

fn system_index(value: Value) -> Result<Option<i64>, Error> {
    match value.present() {
        None => Ok(None),
        Some(Value::Int64(index)) => Ok(Some(*index)),
        Some(other) => Err(prefix_error(other)),
    }
}

fn prefix_error(value: &Value) -> Error {
    Error::new(ErrorKind::Schema).with_message(format!(
        "unexpected {} value in row layout",
        value.kind_name()
    ))
}
