//! Purpose: `csvserve` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All table reads go through `api::TableService`.
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{
    Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::Value;
use std::error::Error as StdError;

mod command_dispatch;
mod serve;
mod table_json;

use csvserve::api::{
    DEFAULT_DATA_DIR, DEFAULT_EXPOSED_TABLES, Error, ErrorKind, ExposedTables, TableService,
    ValidationMode, to_exit_code,
};
use table_json::error_json;

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
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run `csvserve --help` for usage."));
            }
        },
    };

    let exposed = ExposedTables::parse(&cli.source.tables)?;
    let service = TableService::new(cli.source.data_dir, exposed)
        .with_validation(cli.source.validation.into());

    command_dispatch::dispatch_command(cli.command, service)
}

#[derive(Parser)]
#[command(
    name = "csvserve",
    version,
    about = "Serve local CSV files as read-only JSON endpoints",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Each exposed table is one CSV file, `<data-dir>/<table>.csv`, served as `GET /<table>`.
Files are read on every request; edit them in place and the next request sees the change.
"#,
    after_help = r#"EXAMPLES
  $ csvserve serve                                   # 0.0.0.0:8000, ./data, default tables
  $ EXPOSED_TABLES=orders,customers csvserve serve
  $ csvserve check                                   # load every exposed table once
  $ curl localhost:8000/delivery_events

LEARN MORE
  $ csvserve <command> --help"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[command(flatten)]
    source: TableArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct TableArgs {
    #[arg(
        long,
        global = true,
        env = "DATA_DIR",
        default_value = DEFAULT_DATA_DIR,
        help = "Directory holding <table>.csv files",
        value_hint = ValueHint::DirPath
    )]
    data_dir: PathBuf,
    #[arg(
        long,
        global = true,
        env = "EXPOSED_TABLES",
        default_value = DEFAULT_EXPOSED_TABLES,
        value_name = "NAMES",
        help = "Comma-separated table names to expose"
    )]
    tables: String,
    #[arg(
        long,
        global = true,
        env = "SCHEMA_VALIDATION",
        value_enum,
        default_value = "strict",
        help = "Schema validation: strict (reject rows that fail coercion) or off (raw strings)"
    )]
    validation: ValidationModeCli,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ValidationModeCli {
    Strict,
    Off,
}

impl From<ValidationModeCli> for ValidationMode {
    fn from(value: ValidationModeCli) -> Self {
        match value {
            ValidationModeCli::Strict => ValidationMode::Strict,
            ValidationModeCli::Off => ValidationMode::Off,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Serve exposed tables over HTTP",
        after_long_help = r#"ROUTES
  GET /<table>                   all rows as a JSON array (404 if not exposed)
  GET /api/<table>               paged envelope: ?offset=&limit=&start_date=&end_date=
  GET /api/schema/<table>        column names and declared types
  GET /api/tables                CSV files present and the exposed set
  GET /health                    liveness

NOTES
  - Log verbosity follows RUST_LOG (default: info)
  - Load, parse, and validation failures answer 500 with a JSON error body"#
    )]
    Serve(ServeArgs),
    #[command(
        about = "Load every exposed table once and report failures",
        after_help = r#"EXAMPLES
  $ csvserve check
  $ csvserve check --json"#
    )]
    Check {
        #[arg(long, help = "Emit a JSON report")]
        json: bool,
    },
    #[command(about = "List CSV files in the data directory and the exposed set")]
    Tables,
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completion scripts",
        after_help = r#"EXAMPLES
  $ csvserve completion bash > ~/.local/share/bash-completion/completions/csvserve
  $ csvserve completion zsh > ~/.zfunc/_csvserve"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(
        long,
        env = "BIND",
        default_value = "0.0.0.0:8000",
        help = "Bind address",
        help_heading = "Connection"
    )]
    bind: String,
}

fn serve_config_from_args(
    args: ServeArgs,
    service: &TableService,
) -> Result<serve::ServeConfig, Error> {
    let bind: SocketAddr = args.bind.parse().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid bind address")
            .with_hint("Use a host:port value like 0.0.0.0:8000.")
    })?;
    Ok(serve::ServeConfig {
        bind,
        data_dir: service.data_dir().to_path_buf(),
        exposed: service.exposed().clone(),
        validation: service.validation(),
    })
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error:").trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!(
        "error: {}",
        err.message().unwrap_or(err.kind().as_str())
    )];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(table) = err.table() {
        lines.push(format!("table: {table}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(row) = err.row() {
        lines.push(format!("row: {row}"));
    }
    if let Some(field) = err.field() {
        lines.push(format!("field: {field}"));
    }
    if let Some(cause) = err.source() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}
