//! CLI command implementations
//!
//! This module contains all ifcsplit CLI command implementations.

pub mod config;
pub mod diagnose;
pub mod preprocess;
pub mod split;

use std::path::PathBuf;

use anyhow::{Context, Result};
use ifcsplit_config::{ConfigLoader, SplitConfig};

use crate::GlobalOptions;

/// Directory whose `.ifcsplit/config.toml` is the local config.
pub fn working_dir() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to get current directory")
}

/// Build the loader honoring `--config`.
pub fn config_loader(global: &GlobalOptions) -> ConfigLoader {
    let loader = ConfigLoader::new();
    match global.config {
        Some(ref path) => loader.with_config_file(path),
        None => loader,
    }
}

/// Load and validate configuration (global → local or `--config`).
pub fn load_config(global: &GlobalOptions) -> Result<SplitConfig> {
    let root = working_dir()?;
    let config = config_loader(global)
        .load(&root, None)
        .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Print an info message to stderr (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}

/// Print a warning message to stderr.
pub fn print_warning(message: &str) {
    eprintln!("warning: {}", message);
}
