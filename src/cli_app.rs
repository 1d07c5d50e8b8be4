//! Top-level CLI definition and dispatch.

use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use thiserror::Error;

use query_telemetry::core::config::Config;
use query_telemetry::core::errors::QtError;
use query_telemetry::sink::buffer::LogSink;
use query_telemetry::telemetry::parser::{TelemetryParser, is_entry_header};
use query_telemetry::telemetry::query::{TelemetryQueries, normalize_operation_arg};
use query_telemetry::telemetry::record::StoredRecord;
use query_telemetry::telemetry::recorder::TelemetryRecorder;
use query_telemetry::telemetry::sqlite::SqliteTelemetryStore;
use query_telemetry::telemetry::store::TelemetryStore;

/// Entries appended to the sink between recording passes during ingest.
const INGEST_BATCH_ENTRIES: usize = 256;

/// qtel: query telemetry from data-access trace logs.
#[derive(Debug, Parser)]
#[command(
    name = "qtel",
    author,
    version,
    about = "Query Telemetry - statement timings from data-access trace logs",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Override the telemetry database path.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Increase verbosity (debug diagnostics on stderr).
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Parse a trace log and store one record per entry.
    Ingest(IngestArgs),
    /// List every record by duration.
    List(ListArgs),
    /// List records for one operation, slowest first, skipping unparsed durations.
    ByOp(ByOpArgs),
    /// Show one page of the slowest-first listing.
    Page(PageArgs),
    /// Per-operation duration totals.
    Summary,
    /// Show configuration.
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Args)]
struct IngestArgs {
    /// Trace log file, or `-` for stdin.
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct ListArgs {
    /// Fastest first instead of slowest first.
    #[arg(long)]
    asc: bool,
}

#[derive(Debug, Clone, Args)]
struct ByOpArgs {
    /// SELECT, INSERT, UPDATE, DELETE (any case), or a stored fallback string.
    #[arg(value_name = "OPERATION")]
    operation: String,
}

#[derive(Debug, Clone, Args)]
struct PageArgs {
    /// 1-based page number; values below 1 mean page 1.
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    page: i64,
    /// Rows per page; non-positive means the default, large values are capped.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    page_size: i64,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum ConfigCommand {
    /// Print the config file path.
    Path,
    /// Print the effective configuration.
    Show,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    match &cli.command {
        Command::Ingest(args) => run_ingest(cli, &config, args),
        Command::List(args) => run_list(cli, &config, args),
        Command::ByOp(args) => run_by_op(cli, &config, args),
        Command::Page(args) => run_page(cli, &config, args),
        Command::Summary => run_summary(cli, &config),
        Command::Config(args) => run_config(cli, &config, args),
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = Config::load(cli.config.as_deref()).map_err(|e| match e {
        QtError::MissingConfig { .. } | QtError::InvalidConfig { .. } => {
            CliError::User(e.to_string())
        }
        other => CliError::Runtime(other.to_string()),
    })?;
    if let Some(db) = &cli.db {
        config.paths.sqlite_db.clone_from(db);
    }
    Ok(config)
}

fn open_store(config: &Config) -> Result<SqliteTelemetryStore, CliError> {
    SqliteTelemetryStore::open(&config.paths.sqlite_db)
        .map_err(|e| CliError::Runtime(format!("open telemetry database: {e}")))
}

// ──────────────────── ingest ────────────────────

fn run_ingest(cli: &Cli, config: &Config, args: &IngestArgs) -> Result<(), CliError> {
    let reader: Box<dyn BufRead> = if args.input.as_os_str() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(&args.input).map_err(|e| {
            CliError::User(format!("cannot open {}: {e}", args.input.display()))
        })?;
        Box::new(BufReader::new(file))
    };

    let store: Arc<dyn TelemetryStore> = Arc::new(open_store(config)?);
    let sink = LogSink::new(config.sink.max_retained_bytes);
    let parser = TelemetryParser::from_config(sink.clone(), &config.parser);
    let recorder = TelemetryRecorder::new(parser, Arc::clone(&store));

    let mut stored = 0usize;
    let mut malformed = 0usize;
    let mut entry = String::new();
    let mut batched = 0usize;

    // Entries are appended whole so a recording pass never sees half of one.
    let mut flush_entry = |entry: &mut String, force: bool| -> Result<(), CliError> {
        if !entry.is_empty() {
            sink.append(entry);
            entry.clear();
            batched += 1;
        }
        if force || batched >= INGEST_BATCH_ENTRIES {
            let report = recorder
                .record()
                .map_err(|e| CliError::Runtime(format!("record telemetry: {e}")))?;
            stored += report.stored.len();
            malformed += report.malformed.len();
            batched = 0;
        }
        Ok(())
    };

    for line in reader.lines() {
        let line = line?;
        if is_entry_header(&line) {
            flush_entry(&mut entry, false)?;
        }
        entry.push_str(&line);
        entry.push('\n');
    }
    flush_entry(&mut entry, true)?;

    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "Ingested {stored} record(s) into {} ({malformed} malformed entr{} skipped).",
                config.paths.sqlite_db.display(),
                if malformed == 1 { "y" } else { "ies" }
            );
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "ingest",
            "stored": stored,
            "malformed": malformed,
            "db_path": config.paths.sqlite_db.to_string_lossy(),
        }))?,
    }
    Ok(())
}

// ──────────────────── queries ────────────────────

fn run_list(cli: &Cli, config: &Config, args: &ListArgs) -> Result<(), CliError> {
    let store = open_store(config)?;
    let queries = TelemetryQueries::with_config(&store, &config.query);
    let (rows, order) = if args.asc {
        (queries.list_ascending(), "asc")
    } else {
        (queries.list_descending(), "desc")
    };
    let rows = rows.map_err(|e| CliError::Runtime(e.to_string()))?;
    emit_records(cli, json!({ "command": "list", "order": order }), &rows)
}

fn run_by_op(cli: &Cli, config: &Config, args: &ByOpArgs) -> Result<(), CliError> {
    let operation = normalize_operation_arg(&args.operation);
    if operation.is_empty() {
        return Err(CliError::User("operation cannot be empty".to_string()));
    }
    let store = open_store(config)?;
    let rows = TelemetryQueries::with_config(&store, &config.query)
        .list_by_operation(&operation)
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    emit_records(
        cli,
        json!({ "command": "by-op", "operation": operation }),
        &rows,
    )
}

fn run_page(cli: &Cli, config: &Config, args: &PageArgs) -> Result<(), CliError> {
    let store = open_store(config)?;
    let queries = TelemetryQueries::with_config(&store, &config.query);
    let pagination = queries.paginate(args.page, args.page_size);
    let rows = queries
        .list_page(pagination)
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    emit_records(
        cli,
        json!({
            "command": "page",
            "page": pagination.page,
            "page_size": pagination.page_size,
        }),
        &rows,
    )
}

fn run_summary(cli: &Cli, config: &Config) -> Result<(), CliError> {
    let store = open_store(config)?;
    let summary = TelemetryQueries::with_config(&store, &config.query)
        .operation_summary()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    match output_mode(cli) {
        OutputMode::Json => write_json_line(&json!({
            "command": "summary",
            "data": summary,
        })),
        OutputMode::Human => {
            if summary.is_empty() {
                println!("No records with a parsed duration.");
                return Ok(());
            }
            println!(
                "  {:<14}  {:>7}  {:>12}  {:>10}  {:>10}",
                "Operation", "Count", "Total ms", "Max ms", "Mean ms"
            );
            println!("  {}", "-".repeat(61));
            for s in &summary {
                println!(
                    "  {:<14}  {:>7}  {:>12.3}  {:>10.3}  {:>10.3}",
                    display_operation(&s.operation),
                    s.count,
                    s.total_ms,
                    s.max_ms,
                    s.mean_ms
                );
            }
            Ok(())
        }
    }
}

fn run_config(cli: &Cli, config: &Config, args: &ConfigArgs) -> Result<(), CliError> {
    match (args.command.unwrap_or(ConfigCommand::Show), output_mode(cli)) {
        (ConfigCommand::Path, OutputMode::Human) => {
            println!("{}", config.paths.config_file.display());
            Ok(())
        }
        (ConfigCommand::Path, OutputMode::Json) => write_json_line(&json!({
            "command": "config path",
            "path": config.paths.config_file.to_string_lossy(),
            "exists": config.paths.config_file.exists(),
        })),
        (ConfigCommand::Show, OutputMode::Human) => {
            let rendered = toml::to_string_pretty(config)
                .map_err(|e| CliError::Runtime(format!("render config: {e}")))?;
            print!("{rendered}");
            Ok(())
        }
        (ConfigCommand::Show, OutputMode::Json) => {
            let hash = config
                .stable_hash()
                .map_err(|e| CliError::Runtime(e.to_string()))?;
            write_json_line(&json!({
                "command": "config show",
                "config": config,
                "hash": hash,
            }))
        }
    }
}

// ──────────────────── output ────────────────────

fn emit_records(cli: &Cli, mut header: Value, rows: &[StoredRecord]) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Json => {
            header["data"] = serde_json::to_value(rows)?;
            write_json_line(&header)
        }
        OutputMode::Human => {
            if rows.is_empty() {
                println!("No records.");
                return Ok(());
            }
            let mut stdout = io::stdout().lock();
            writeln!(
                stdout,
                "  {:>6}  {:<10}  {:<8}  {:>12}  {}",
                "Id", "Date", "Time", "Duration ms", "Operation"
            )?;
            writeln!(stdout, "  {}", "-".repeat(56))?;
            for row in rows {
                writeln!(
                    stdout,
                    "  {:>6}  {:<10}  {:<8}  {:>12.3}  {}",
                    row.id,
                    row.record.date,
                    row.record.time,
                    row.record.duration_ms,
                    display_operation(&row.record.operation),
                )?;
            }
            Ok(())
        }
    }
}

fn display_operation(operation: &str) -> &str {
    if operation.is_empty() { "-" } else { operation }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("QTEL_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
