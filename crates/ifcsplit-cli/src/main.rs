//! ifcsplit CLI - Split large IFC building models
//!
//! A command-line interface for partitioning IFC models into smaller,
//! independently valid files, and for assessing and slimming files that are
//! too large to load.
//!
//! # Usage
//!
//! ```bash
//! # One file per building storey
//! ifcsplit split tower.ifc out/
//!
//! # Fixed-size chunks after removing annotations, grids and projections
//! ifcsplit split tower.ifc out/ --method chunks --max-elements 50000 --clean
//!
//! # Quick assessment without loading the model
//! ifcsplit diagnose tower.ifc
//!
//! # Strip non-essential instances line by line
//! ifcsplit preprocess tower.ifc
//! ```

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use ifcsplit_config::{LogFormat, LoggingConfig};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;
mod progress;

/// ifcsplit - Partition large IFC models into smaller files
#[derive(Parser, Debug)]
#[command(name = "ifcsplit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Path to configuration file (replaces .ifcsplit/config.toml)
    #[arg(long, short = 'c', global = true, env = "IFCSPLIT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split a model into partition files
    Split(commands::split::SplitArgs),

    /// Assess a file from a leading sample without loading it
    Diagnose(commands::diagnose::DiagnoseArgs),

    /// Drop non-essential instances with a streaming line filter
    Preprocess(commands::preprocess::PreprocessArgs),

    /// View and manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = commands::load_config(&cli.global)?;
    init_logging(&cli.global, &config.logging)?;

    match cli.command {
        Commands::Split(args) => commands::split::execute(args, config, cli.global),
        Commands::Diagnose(args) => commands::diagnose::execute(args, config, cli.global),
        Commands::Preprocess(args) => commands::preprocess::execute(args, config, cli.global),
        Commands::Config(cmd) => commands::config::execute(cmd, config, cli.global),
    }
}

/// Install the global log subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--quiet`/`--verbose`, then the
/// configured level.
fn init_logging(global: &GlobalOptions, logging: &LoggingConfig) -> Result<()> {
    let level = if global.quiet {
        "error"
    } else if global.verbose {
        "debug"
    } else {
        logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let writer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer);
    match logging.format {
        LogFormat::Text => builder.with_ansi(logging.file.is_none()).try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))
}
