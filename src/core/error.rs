use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// I/O failure or truncation reported by the byte source.
    Stream,
    /// Unresolved registry reference or malformed schema node.
    Schema,
    /// Bytes that do not fit the declared schema.
    Decode,
    /// Destination type mismatch while projecting a row.
    Scan,
    Usage,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    table_index: Option<u16>,
    row: Option<u64>,
    offset: Option<u64>,
    column: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            table_index: None,
            row: None,
            offset: None,
            column: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn table_index(&self) -> Option<u16> {
        self.table_index
    }

    /// 1-based ordinal of the row being decoded when the error was raised.
    pub fn row(&self) -> Option<u64> {
        self.row
    }

    /// Absolute stream offset at which the failure was detected.
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_table_index(mut self, table_index: u16) -> Self {
        self.table_index = Some(table_index);
        self
    }

    pub fn with_row(mut self, row: u64) -> Self {
        self.row = Some(row);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        if self.column.is_none() {
            self.column = Some(column.into());
        }
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Copy of the kind and context without the boxed source.
    pub(crate) fn detached(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            hint: self.hint.clone(),
            table_index: self.table_index,
            row: self.row,
            offset: self.offset,
            column: self.column.clone(),
            source: None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(column) = &self.column {
            write!(f, " (column: {column})")?;
        }
        if let Some(table_index) = self.table_index {
            write!(f, " (table: {table_index})")?;
        }
        if let Some(row) = self.row {
            write!(f, " (row: {row})")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " (offset: {offset})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Usage => 2,
        ErrorKind::Io => 3,
        ErrorKind::Schema => 4,
        ErrorKind::Stream => 5,
        ErrorKind::Decode => 6,
        ErrorKind::Scan => 7,
    }
}
