// FleetGrid CLI - headless editing of a maintenance or contact grid
// The store is a JSON file; every command loads it, runs one grid
// operation to completion (timers included), and writes it back.

mod exit_codes;
mod file_store;

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use fleetgrid_config::GridSettings;
use fleetgrid_core::clipboard;
use fleetgrid_core::{Coord, Range};
use fleetgrid_engine::dates::parse_date_text;
use fleetgrid_engine::normalize::normalize_pasted;
use fleetgrid_engine::{GridEvent, GridHarness, KeyCommand, ManualClock, RecordId, RecordKind, Schema};

use exit_codes::{
    notice_exit_code, EXIT_ERROR, EXIT_STORE_IO, EXIT_STORE_PARSE, EXIT_SUCCESS, EXIT_USAGE,
};
use file_store::{FileStoreError, JsonFileStore};

#[derive(Parser)]
#[command(name = "fleetgrid")]
#[command(about = "Maintenance planning grid (CLI mode, headless)")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Store file (JSON). Created on the first write.
    #[arg(long, short = 's', env = "FLEETGRID_STORE")]
    store: PathBuf,

    /// Which grid the store holds
    #[arg(long, short = 'k', value_enum, default_value = "maintenance")]
    kind: Kind,

    /// Settings file (JSON or TOML). Defaults to the user settings.json
    #[arg(long)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins.
    #[arg(long, short = 'v', action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Maintenance,
    Contacts,
}

impl From<Kind> for RecordKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Maintenance => RecordKind::Maintenance,
            Kind::Contacts => RecordKind::Contact,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print visible rows as TSV (id first, then every column)
    #[command(after_help = "\
Examples:
  fleetgrid -s plan.json list
  fleetgrid -s plan.json list --filter ravel
  fleetgrid -s plan.json list --json")]
    List {
        /// Global filter: rows containing this text in any column
        #[arg(long)]
        filter: Option<String>,

        /// Emit a JSON array instead of TSV
        #[arg(long)]
        json: bool,
    },

    /// Print a rectangle of cells as clipboard text
    Copy {
        /// First corner, ROW:COL (zero-based, visible rows)
        #[arg(value_parser = parse_cell)]
        start: Coord,
        /// Opposite corner, ROW:COL
        #[arg(value_parser = parse_cell)]
        end: Coord,
    },

    /// Paste clipboard text read from stdin with its top-left at ROW COL
    #[command(after_help = "\
Examples:
  printf 'F1\\tE12\\nF2\\tE13\\n' | fleetgrid -s plan.json paste 0 0")]
    Paste { row: usize, col: usize },

    /// Clear every cell in a rectangle
    Clear {
        #[arg(value_parser = parse_cell)]
        start: Coord,
        #[arg(value_parser = parse_cell)]
        end: Coord,
    },

    /// Drag the fill handle of a rectangle down to row --to
    Fill {
        #[arg(value_parser = parse_cell)]
        start: Coord,
        #[arg(value_parser = parse_cell)]
        end: Coord,
        /// Last target row
        #[arg(long = "to")]
        target: usize,
    },

    /// Set one cell. COL is a column index or field name.
    Set { row: usize, col: String, value: String },

    /// Append blank rows
    AddRows {
        #[arg(default_value_t = 1)]
        count: usize,
    },

    /// Delete a row by record id
    Delete { id: i64 },

    /// Duplicate a row by record id
    Duplicate { id: i64 },

    /// Restore the blank-row floor now
    Supply,

    /// Put contact rows in the given order (record ids)
    Reorder {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  fleetgrid-engine ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn store(err: FileStoreError) -> Self {
        let code = match err {
            FileStoreError::Io { .. } => EXIT_STORE_IO,
            FileStoreError::Parse { .. } | FileStoreError::WrongKind { .. } => EXIT_STORE_PARSE,
        };
        let hint = match &err {
            FileStoreError::WrongKind { .. } => Some("pass --kind to match the store file".to_string()),
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    /// Non-zero exit with nothing more to print (notices already shown).
    pub fn silent(code: u8) -> Self {
        Self { code, message: String::new(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn parse_cell(s: &str) -> Result<Coord, String> {
    let (row, col) = s
        .split_once(':')
        .ok_or_else(|| format!("expected ROW:COL, got '{}'", s))?;
    let row = row.trim().parse().map_err(|_| format!("bad row in '{}'", s))?;
    let col = col.trim().parse().map_err(|_| format!("bad column in '{}'", s))?;
    Ok(Coord::new(row, col))
}

// ============================================================================
// Session
// ============================================================================

type Session = GridHarness<JsonFileStore>;

fn open(cli: &Cli) -> Result<Session, CliError> {
    let settings = match &cli.config {
        Some(path) => GridSettings::load_from(path).map_err(CliError::args)?,
        None => GridSettings::load(),
    };
    let schema = Schema::for_kind(cli.kind.into());
    // Timers are fast-forwarded, so the clock only needs to start at now
    let clock = ManualClock::new(Utc::now());
    let store = JsonFileStore::open(&cli.store, schema, Rc::new(clock.clone())).map_err(CliError::store)?;
    Ok(GridHarness::new(store, schema, settings, clock))
}

/// Run outstanding work and timers, save, and report notices.
fn finish(mut session: Session) -> Result<(), CliError> {
    session.settle();
    if session.store().is_dirty() {
        session.store_mut().save().map_err(CliError::store)?;
    }

    let mut code = None;
    for event in session.grid_mut().drain_events() {
        match event {
            GridEvent::Notice { title, message } => {
                eprintln!("{}: {}", title, message);
                code.get_or_insert(notice_exit_code(&title));
            }
            other => log::debug!("{:?}", other),
        }
    }
    match code {
        Some(code) => Err(CliError::silent(code)),
        None => Ok(()),
    }
}

fn check_cell(session: &Session, at: Coord) -> Result<(), CliError> {
    let rows = session.grid().view().visible_count();
    let cols = session.grid().schema().column_count();
    if at.row >= rows || at.col >= cols {
        return Err(CliError::args(format!(
            "cell {}:{} is outside the grid ({} rows x {} columns)",
            at.row, at.col, rows, cols
        ))
        .with_hint("run `fleetgrid list` to see the rows"));
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut session = open(&cli)?;

    match cli.command {
        Commands::List { filter, json } => return cmd_list(&mut session, filter, json),
        Commands::Copy { start, end } => return cmd_copy(&session, start, end),
        Commands::Paste { row, col } => cmd_paste(&mut session, row, col)?,
        Commands::Clear { start, end } => cmd_clear(&mut session, start, end)?,
        Commands::Fill { start, end, target } => cmd_fill(&mut session, start, end, target)?,
        Commands::Set { row, col, value } => cmd_set(&mut session, row, &col, &value)?,
        Commands::AddRows { count } => {
            session.grid_mut().add_rows(count);
        }
        Commands::Delete { id } => {
            require_row(&session, id)?;
            session.grid_mut().delete_row(RecordId::Stored(id));
        }
        Commands::Duplicate { id } => {
            require_row(&session, id)?;
            session.grid_mut().duplicate_row(RecordId::Stored(id));
        }
        Commands::Supply => {
            session.grid_mut().reassert_row_floor_now();
        }
        Commands::Reorder { ids } => cmd_reorder(&mut session, ids)?,
    }

    finish(session)
}

fn require_row(session: &Session, id: i64) -> Result<(), CliError> {
    match session.grid().record(RecordId::Stored(id)) {
        Some(_) => Ok(()),
        None => Err(CliError::args(format!("no row with id {}", id))),
    }
}

// ============================================================================
// list / copy
// ============================================================================

fn cmd_list(session: &mut Session, filter: Option<String>, json: bool) -> Result<(), CliError> {
    let snap = match filter {
        Some(text) => session.grid_mut().set_global_filter(&text),
        None => session.grid().snapshot(),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        let rows: Vec<serde_json::Value> = snap
            .rows
            .iter()
            .map(|row| {
                let cells: serde_json::Map<String, serde_json::Value> = snap
                    .columns
                    .iter()
                    .zip(&row.cells)
                    .map(|(name, text)| (name.to_string(), serde_json::Value::String(text.clone())))
                    .collect();
                serde_json::json!({
                    "id": row.id.to_string(),
                    "empty": row.empty,
                    "cells": cells,
                })
            })
            .collect();
        let text = serde_json::to_string_pretty(&rows).map_err(|e| CliError::io(e.to_string()))?;
        writeln!(out, "{}", text).map_err(|e| CliError::io(e.to_string()))?;
    } else {
        let header = std::iter::once("id".to_string()).chain(snap.columns.iter().map(|c| c.to_string()));
        let body = snap
            .rows
            .iter()
            .map(|row| std::iter::once(row.id.to_string()).chain(row.cells.iter().cloned()).collect::<Vec<_>>());
        let text = clipboard::serialize(std::iter::once(header.collect::<Vec<_>>()).chain(body));
        out.write_all(text.as_bytes()).map_err(|e| CliError::io(e.to_string()))?;
    }

    if snap.is_filtered {
        eprintln!("{} of {} rows match", snap.visible_non_empty, snap.total_non_empty);
    }
    Ok(())
}

fn cmd_copy(session: &Session, start: Coord, end: Coord) -> Result<(), CliError> {
    check_cell(session, start)?;
    check_cell(session, end)?;
    let text = session.grid().copy_text(Range::spanning(start, end));
    io::stdout()
        .lock()
        .write_all(text.as_bytes())
        .map_err(|e| CliError::io(e.to_string()))
}

// ============================================================================
// Editing
// ============================================================================

fn cmd_paste(session: &mut Session, row: usize, col: usize) -> Result<(), CliError> {
    let at = Coord::new(row, col);
    check_cell(session, at)?;
    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .map_err(|e| CliError::io(format!("reading stdin: {}", e)))?;
    if clipboard::parse(&text).is_empty() {
        return Err(CliError::args("nothing to paste on stdin"));
    }
    session.grid_mut().paste_text(at, &text);
    Ok(())
}

fn cmd_clear(session: &mut Session, start: Coord, end: Coord) -> Result<(), CliError> {
    check_cell(session, start)?;
    check_cell(session, end)?;
    let grid = session.grid_mut();
    grid.select(Range::spanning(start, end));
    grid.key(KeyCommand::Delete);
    Ok(())
}

fn cmd_fill(session: &mut Session, start: Coord, end: Coord, target: usize) -> Result<(), CliError> {
    check_cell(session, start)?;
    check_cell(session, end)?;
    let source = Range::spanning(start, end);
    if target <= source.end_row {
        return Err(CliError::args(format!(
            "--to {} must be below the source rows {}..{}",
            target, source.start_row, source.end_row
        )));
    }

    let grid = session.grid_mut();
    grid.mouse_down(source.start_row, source.start_col);
    grid.mouse_enter(source.end_row, source.end_col);
    grid.mouse_up();
    grid.fill_handle_mouse_down();
    grid.mouse_enter(target, source.end_col);
    grid.mouse_up();
    Ok(())
}

fn cmd_set(session: &mut Session, row: usize, col: &str, value: &str) -> Result<(), CliError> {
    let schema = *session.grid().schema();
    let index = match col.parse::<usize>() {
        Ok(index) => index,
        Err(_) => schema
            .column_index(col)
            .ok_or_else(|| CliError::args(format!("unknown column '{}'", col)))?,
    };
    check_cell(session, Coord::new(row, index))?;
    let field = schema
        .column(index)
        .ok_or_else(|| CliError::args(format!("unknown column {}", index)))?;
    let id = session
        .grid()
        .record_at(row)
        .map(|r| r.id)
        .ok_or_else(|| CliError::args(format!("no row {}", row)))?;

    normalize_pasted(&schema, field.name, value).map_err(|e| CliError::args(e.to_string()))?;
    let text = if value.trim().is_empty() { "" } else { value };

    // The entry date also sets the week, as the date picker does
    match (field.name, parse_date_text(text)) {
        ("entree", Some(entry)) if schema.kind() == RecordKind::Maintenance => {
            session.grid_mut().set_entry_date(id, entry);
        }
        _ => {
            session.grid_mut().update_cell(id, field.name, text);
        }
    }
    Ok(())
}

fn cmd_reorder(session: &mut Session, ids: Vec<i64>) -> Result<(), CliError> {
    if session.grid().schema().order_field().is_none() {
        return Err(CliError::args("only contact rows have a manual order").with_hint("pass --kind contacts"));
    }
    for id in &ids {
        require_row(session, *id)?;
    }
    let ids: Vec<RecordId> = ids.into_iter().map(RecordId::Stored).collect();
    session.grid_mut().reorder(&ids);
    Ok(())
}
