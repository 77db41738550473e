//! Diagnose command - Assess a file without loading it

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ifcsplit_config::SplitConfig;

use crate::progress;
use crate::GlobalOptions;

/// Arguments for the diagnose command
#[derive(Args, Debug)]
pub struct DiagnoseArgs {
    /// File to assess
    input: PathBuf,

    /// Bytes to sample from the start of the file
    #[arg(long)]
    sample_bytes: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the diagnose command
pub fn execute(args: DiagnoseArgs, config: SplitConfig, global: GlobalOptions) -> Result<()> {
    let sample_bytes = args.sample_bytes.unwrap_or(config.diagnose.sample_bytes);

    let spinner = progress::spinner(
        &format!("Sampling {}", args.input.display()),
        global.quiet || args.json,
    );
    let diagnosis = ifcsplit_core::diagnose(&args.input, sample_bytes)
        .with_context(|| format!("Failed to diagnose {}", args.input.display()))?;
    progress::finish_progress(spinner);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&diagnosis)?);
    } else {
        print!("{}", diagnosis.render());
    }

    Ok(())
}
