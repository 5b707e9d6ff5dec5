use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::storage;

pub mod commands;

use self::commands::{DeleteArgs, EditArgs, NewArgs, PasteArgs, ShowArgs};

#[derive(Parser, Debug)]
#[command(
    name = "notepad",
    version,
    about = "Edit single notes through managed editing sessions"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file location (takes precedence over NOTEPAD_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over NOTEPAD_DATA)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new note
    New(NewArgs),
    /// Edit an existing note
    Edit(EditArgs),
    /// Import text or a copy of another note as a new note
    Paste(PasteArgs),
    /// Delete a note
    Delete(DeleteArgs),
    /// Print a note, optionally highlighting a search term
    Show(ShowArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let storage = storage::init(&paths, &config.storage)?;

    let options = config.session;
    match cli.command {
        Commands::New(args) => commands::new_note(storage, options, args),
        Commands::Edit(args) => commands::edit_note(storage, options, args),
        Commands::Paste(args) => commands::paste_note(storage, options, args),
        Commands::Delete(args) => commands::delete_note(storage, args),
        Commands::Show(args) => commands::show_note(&storage, args),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
