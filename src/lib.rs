pub mod add;
pub mod cli;
pub mod config;
pub mod data;
pub mod diff;
pub mod error;
pub mod filter;
pub mod frame;
pub mod io_utils;
pub mod markets;
pub mod normalize;
pub mod progress;
pub mod session;
pub mod source;
pub mod statement;
pub mod table;
pub mod targets;
pub mod write;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands, InitArgs, MarketCommands},
    config::Config,
    session::Session,
    source::SqliteSource,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("closer_targets", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

/// One user session bound to an open warehouse.
pub struct Desk {
    pub session: Session,
    pub source: SqliteSource,
}

impl Desk {
    pub fn open(config: Config) -> Result<Self> {
        let source = SqliteSource::open(&config.warehouse)?;
        source.init_schema(&config.tables)?;
        Ok(Self {
            session: Session::new(config),
            source,
        })
    }
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(path) = cli.warehouse {
        config.warehouse = path;
    }
    let mut desk = Desk::open(config)?;
    match cli.command {
        Commands::Init(args) => handle_init(&mut desk, &args),
        Commands::Export(args) => targets::execute_export(&mut desk, &args),
        Commands::Options(args) => targets::execute_options(&mut desk, &args),
        Commands::Apply(args) => targets::execute_apply(&mut desk, &args),
        Commands::Add(args) => add::execute(&mut desk, &args),
        Commands::Markets(MarketCommands::Export(args)) => markets::execute_export(&mut desk, &args),
        Commands::Markets(MarketCommands::Apply(args)) => markets::execute_apply(&mut desk, &args),
        Commands::Progress(args) => progress::execute(&mut desk, &args),
    }
}

fn handle_init(desk: &mut Desk, args: &InitArgs) -> Result<()> {
    info!("Warehouse {} ready", desk.session.config.warehouse.display());
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let tables = desk.session.config.tables.clone();
    for (path, table) in [
        (&args.targets, &tables.targets),
        (&args.markets, &tables.markets),
        (&args.users, &tables.users),
        (&args.appointments, &tables.appointments),
    ] {
        let Some(path) = path else {
            continue;
        };
        let loaded = seed_table(desk, path, table, args.delimiter, encoding)?;
        info!("Loaded {loaded} row(s) from {:?} into {table}", path);
    }
    Ok(())
}

fn seed_table(
    desk: &mut Desk,
    path: &Path,
    table: &str,
    delimiter: Option<u8>,
    encoding: &'static encoding_rs::Encoding,
) -> Result<usize> {
    let delimiter = io_utils::resolve_delimiter(path, delimiter);
    let frame = io_utils::read_frame(path, delimiter, encoding)?;
    desk.source
        .insert_frame(table, &frame)
        .with_context(|| format!("Seeding {table} from {path:?}"))
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
