//! Config command - View and manage configuration
//!
//! Provides commands for viewing and creating ifcsplit configuration:
//! - Show the effective (merged) configuration
//! - Create a default config file (local or global)
//! - Show configuration file paths

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use ifcsplit_config::SplitConfig;
use serde::Serialize;

use super::{config_loader, working_dir};
use crate::GlobalOptions;

/// Config management commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show(ShowArgs),

    /// Create a config file with default values
    Init(InitArgs),

    /// Show configuration file paths
    Path(PathArgs),
}

/// Arguments for the show command
#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Output as JSON instead of TOML
    #[arg(long)]
    json: bool,
}

/// Arguments for the init command
#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Create the global config (~/.ifcsplit/config.toml) instead of local
    #[arg(long)]
    global: bool,
}

/// Arguments for the path command
#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Configuration paths
#[derive(Debug, Clone, Serialize)]
pub struct ConfigPaths {
    /// Global config file path
    pub global: Option<PathBuf>,
    /// Local config file path
    pub local: PathBuf,
    /// Explicit config file from --config
    pub explicit: Option<PathBuf>,
    /// Whether global config exists
    pub global_exists: bool,
    /// Whether local config exists
    pub local_exists: bool,
}

/// Execute the config command
pub fn execute(cmd: ConfigCommand, config: SplitConfig, global: GlobalOptions) -> Result<()> {
    match cmd {
        ConfigCommand::Show(args) => execute_show(args, &config),
        ConfigCommand::Init(args) => execute_init(args, &global),
        ConfigCommand::Path(args) => execute_path(args, &global),
    }
}

fn execute_show(args: ShowArgs, config: &SplitConfig) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!(
            "{}",
            toml::to_string_pretty(config).context("Failed to render configuration")?
        );
    }
    Ok(())
}

fn execute_init(args: InitArgs, global: &GlobalOptions) -> Result<()> {
    let loader = config_loader(global);
    let path = if args.global {
        loader
            .init_global()
            .context("Failed to create global config")?
    } else {
        loader
            .init_local(&working_dir()?)
            .context("Failed to create local config")?
    };
    println!("{}", path.display());
    Ok(())
}

fn execute_path(args: PathArgs, global: &GlobalOptions) -> Result<()> {
    let loader = config_loader(global);
    let global_path = loader.global_config_path();
    let local = loader.local_config_path(&working_dir()?);

    let paths = ConfigPaths {
        global_exists: global_path.as_ref().is_some_and(|p| p.exists()),
        global: global_path,
        local_exists: local.exists(),
        local,
        explicit: global.config.clone(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&paths)?);
    } else {
        let mark = |exists: bool| if exists { "" } else { " (not found)" };
        match &paths.global {
            Some(path) => println!("Global: {}{}", path.display(), mark(paths.global_exists)),
            None => println!("Global: (no home directory)"),
        }
        println!("Local:  {}{}", paths.local.display(), mark(paths.local_exists));
        if let Some(explicit) = &paths.explicit {
            println!("Explicit: {}{}", explicit.display(), mark(explicit.exists()));
        }
    }
    Ok(())
}
