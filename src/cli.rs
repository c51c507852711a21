use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Edit closer targets and markets against the warehouse", long_about = None)]
pub struct Cli {
    /// YAML configuration file (defaults to closer-targets.yaml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Warehouse database file, overriding the configured one
    #[arg(long, global = true)]
    pub warehouse: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the warehouse tables and optionally seed them from CSV files
    Init(InitArgs),
    /// Write the filtered target grid for editing
    Export(ExportArgs),
    /// List the options each filter selector offers given earlier selections
    Options(SelectionArgs),
    /// Sync an edited target grid back to the warehouse
    Apply(GridApplyArgs),
    /// Add a closer through the explicit add form
    Add(AddArgs),
    /// Export or apply the market reference grid
    #[command(subcommand)]
    Markets(MarketCommands),
    /// Show this week's appointments against each closer's goal
    Progress(ProgressArgs),
}

#[derive(Debug, Subcommand)]
pub enum MarketCommands {
    /// Write the market grid for editing
    Export(MarketExportArgs),
    /// Sync an edited market grid (adds, edits, removals) back to the warehouse
    Apply(GridApplyArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct SelectionArgs {
    /// Market to select ("All Markets" or omitted selects every market)
    #[arg(long)]
    pub market: Option<String>,
    /// Closer to select ("All Closers" or omitted selects every closer)
    #[arg(long)]
    pub closer: Option<String>,
    /// Channel type to select ("All Channels" or omitted selects every channel)
    #[arg(long)]
    pub channel: Option<String>,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// CSV of closer targets to load
    #[arg(long)]
    pub targets: Option<PathBuf>,
    /// CSV of markets to load
    #[arg(long)]
    pub markets: Option<PathBuf>,
    /// CSV of users to load
    #[arg(long)]
    pub users: Option<PathBuf>,
    /// CSV of appointments to load
    #[arg(long)]
    pub appointments: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,
    /// Grid file to write (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Render the grid as a table instead of CSV
    #[arg(long)]
    pub table: bool,
    /// CSV delimiter character for the grid
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct GridApplyArgs {
    /// The grid as it was exported
    #[arg(short, long)]
    pub baseline: PathBuf,
    /// The grid after editing
    #[arg(short, long)]
    pub edited: PathBuf,
    /// Write the per-row report as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Rewrite the baseline file so it reflects the accepted edits
    #[arg(long = "write-baseline")]
    pub write_baseline: bool,
    /// Print the statements that would run without executing them
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// CSV delimiter character for the grids
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the grid files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Closer name, as listed among current closers and managers
    #[arg(long)]
    pub name: String,
    /// Market the closer belongs to
    #[arg(long)]
    pub market: String,
    /// Channel type (defaults to the configured default)
    #[arg(long)]
    pub channel: Option<String>,
    /// Web-to-home appointment goal
    #[arg(long, default_value_t = 12, value_parser = clap::value_parser!(i64).range(0..=60))]
    pub goal: i64,
    /// Web-to-home rank
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(i64).range(0..=60))]
    pub rank: i64,
    /// Field marketing appointment goal
    #[arg(long = "secondary-goal", default_value_t = 12, value_parser = clap::value_parser!(i64).range(0..=60))]
    pub secondary_goal: i64,
    /// Field marketing rank
    #[arg(long = "secondary-rank", default_value_t = 1, value_parser = clap::value_parser!(i64).range(0..=60))]
    pub secondary_rank: i64,
    /// Add the closer as inactive
    #[arg(long)]
    pub inactive: bool,
    /// Free-text notes
    #[arg(long, default_value = "")]
    pub notes: String,
}

#[derive(Debug, Args)]
pub struct MarketExportArgs {
    /// Grid file to write (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Render the grid as a table instead of CSV
    #[arg(long)]
    pub table: bool,
    /// CSV delimiter character for the grid
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct ProgressArgs {
    /// Any day in the week to report (defaults to today)
    #[arg(long = "week-of")]
    pub week_of: Option<NaiveDate>,
    /// Include inactive closers
    #[arg(long)]
    pub all: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
