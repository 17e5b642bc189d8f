//! Purpose: `skiff` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Decoded rows are emitted as one JSON object per line on stdout.
//! Invariants: Errors are emitted as JSON on stderr (plain text when stderr is a TTY).
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use skiff::api::{DEFAULT_MAX_STRING_LEN, Error, ErrorKind, to_exit_code};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod row_json;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = err
                    .to_string()
                    .lines()
                    .next()
                    .unwrap_or("invalid arguments")
                    .trim_start_matches("error: ")
                    .to_string();
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(message)
                    .with_hint("Run `skiff --help` for usage."));
            }
        },
    };

    command_dispatch::dispatch_command(cli.command)
}

#[derive(Parser)]
#[command(
    name = "skiff",
    version,
    about = "Decode Skiff binary row streams",
    long_about = None,
    after_help = r#"EXAMPLES
  $ skiff check --format format.json
  $ skiff decode --format format.json --input rows.skiff
  $ cat rows.skiff | skiff decode --format format.json --table 1

The format descriptor is JSON:
  {"name": "skiff",
   "table_skiff_schemas": ["$row"],
   "skiff_schema_registry": {"row": {"wire_type": "tuple", "children": [...]}}}"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Decode a Skiff stream into JSON lines")]
    Decode {
        #[arg(long, help = "Format descriptor (JSON)", value_hint = ValueHint::FilePath)]
        format: PathBuf,
        #[arg(
            long,
            help = "Skiff stream to decode (default: stdin)",
            value_hint = ValueHint::FilePath
        )]
        input: Option<PathBuf>,
        #[arg(long, help = "Only emit rows from this table index")]
        table: Option<u16>,
        #[arg(long, help = "Stop after emitting this many rows")]
        limit: Option<u64>,
        #[arg(
            long,
            default_value_t = DEFAULT_MAX_STRING_LEN,
            help = "Largest string32/yson32 payload accepted, in bytes"
        )]
        max_string_len: usize,
        #[arg(long, help = "Treat any nonzero boolean byte as true")]
        lenient_booleans: bool,
    },
    #[command(about = "Resolve and validate a format descriptor")]
    Check {
        #[arg(long, help = "Format descriptor (JSON)", value_hint = ValueHint::FilePath)]
        format: PathBuf,
    },
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ skiff completion bash > ~/.local/share/bash-completion/completions/skiff
  $ skiff completion zsh > ~/.zfunc/_skiff"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("error: {err}");
        if let Some(hint) = err.hint() {
            eprintln!("hint: {hint}");
        }
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Usage\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert(
        "message".to_string(),
        json!(err.message().unwrap_or("unknown error")),
    );
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(column) = err.column() {
        inner.insert("column".to_string(), json!(column));
    }
    if let Some(table_index) = err.table_index() {
        inner.insert("table_index".to_string(), json!(table_index));
    }
    if let Some(row) = err.row() {
        inner.insert("row".to_string(), json!(row));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = std::error::Error::source(err);
    while let Some(source) = current {
        causes.push(source.to_string());
        current = source.source();
    }
    causes
}

fn completion(shell: Shell) -> RunOutcome {
    let mut cmd = Cli::command();
    clap_complete::aot::generate(shell, &mut cmd, "skiff", &mut io::stdout());
    RunOutcome::ok()
}
