//! Purpose: Hold top-level CLI command dispatch for `skiff`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Rows are flushed as they decode; a failure mid-stream still leaves earlier rows on stdout.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use memmap2::Mmap;
use skiff::api::{Decoder, DecoderOptions, Format};

use super::*;
use crate::row_json::{format_json, row_json};

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => Ok(completion(shell)),
        Command::Check { format } => {
            let format = load_format(&format)?;
            write_line(&mut io::stdout().lock(), &format_json(&format))?;
            Ok(RunOutcome::ok())
        }
        Command::Decode {
            format,
            input,
            table,
            limit,
            max_string_len,
            lenient_booleans,
        } => {
            let format = load_format(&format)?;
            let options = DecoderOptions::new()
                .with_max_string_len(max_string_len)
                .with_strict_booleans(!lenient_booleans);
            let filter = RowFilter { table, limit };
            match input {
                Some(path) => {
                    let file = File::open(&path).map_err(|err| io_error(&path, err))?;
                    // SAFETY: the map is read-only and dropped before this command returns.
                    let mmap = unsafe { Mmap::map(&file) }.map_err(|err| io_error(&path, err))?;
                    decode_stream(&mmap[..], format, options, filter)
                }
                None => decode_stream(io::stdin().lock(), format, options, filter),
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct RowFilter {
    table: Option<u16>,
    limit: Option<u64>,
}

fn decode_stream<R: Read>(
    source: R,
    format: Format,
    options: DecoderOptions,
    filter: RowFilter,
) -> Result<RunOutcome, Error> {
    let mut decoder = Decoder::with_options(source, format, options);
    let mut out = BufWriter::new(io::stdout().lock());
    let mut emitted = 0u64;

    while filter.limit.is_none_or(|limit| emitted < limit) && decoder.next() {
        if filter.table.is_some_and(|table| table != decoder.table_index()) {
            continue;
        }
        write_line(&mut out, &row_json(&decoder))?;
        emitted += 1;
    }
    out.flush().map_err(stdout_error)?;

    let rows_read = decoder.rows_read();
    decoder.finish().map_err(|err| {
        err.with_hint(format!(
            "{rows_read} row(s) decoded before the failure; the stream cannot be resynchronized."
        ))
    })?;
    Ok(RunOutcome::ok())
}

fn load_format(path: &Path) -> Result<Format, Error> {
    let text = fs::read_to_string(path).map_err(|err| io_error(path, err))?;
    Format::from_json(&text).map_err(|err| {
        let message = format!(
            "{}: {}",
            path.display(),
            err.message().unwrap_or("invalid format descriptor")
        );
        let hint = err
            .hint()
            .unwrap_or("Check the descriptor against `skiff --help`.")
            .to_string();
        Error::new(ErrorKind::Schema).with_message(message).with_hint(hint)
    })
}

fn write_line(out: &mut impl Write, value: &serde_json::Value) -> Result<(), Error> {
    serde_json::to_writer(&mut *out, value).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write output")
            .with_source(err)
    })?;
    out.write_all(b"\n").map_err(stdout_error)
}

fn io_error(path: &Path, err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message(format!("{}: {err}", path.display()))
        .with_source(err)
}

fn stdout_error(err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write output")
        .with_source(err)
}
