//! Preprocess command - Streaming instance filter

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ifcsplit_config::SplitConfig;
use ifcsplit_core::{default_output_path, preprocess};

use super::print_info;
use crate::progress;
use crate::GlobalOptions;

/// Arguments for the preprocess command
#[derive(Args, Debug)]
pub struct PreprocessArgs {
    /// File to filter
    input: PathBuf,

    /// Output file (default: <input>_preprocessed.ifc)
    output: Option<PathBuf>,

    /// Additional instance types to drop (repeatable)
    #[arg(long = "exclude", value_name = "TYPE")]
    exclude: Vec<String>,

    /// Drop instance lines longer than this many bytes
    #[arg(long)]
    max_line_len: Option<usize>,

    /// Output statistics as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the preprocess command
pub fn execute(args: PreprocessArgs, config: SplitConfig, global: GlobalOptions) -> Result<()> {
    let mut options = config.preprocess;
    for tag in args.exclude {
        if !options
            .exclude_tags
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&tag))
        {
            options.exclude_tags.push(tag);
        }
    }
    if let Some(max_line_len) = args.max_line_len {
        options.max_line_len = max_line_len;
    }

    let output = args
        .output
        .unwrap_or_else(|| default_output_path(&args.input));

    let quiet = global.quiet || args.json;
    let spinner = progress::spinner(&format!("Filtering {}", args.input.display()), quiet);
    let result = preprocess(&args.input, &output, &options);
    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            progress::finish_spinner_error(spinner, "Preprocess failed");
            return Err(e)
                .with_context(|| format!("Failed to preprocess {}", args.input.display()));
        }
    };
    progress::finish_spinner(
        spinner,
        &format!(
            "Kept {} of {} lines",
            stats.lines_kept, stats.lines_processed
        ),
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    print_info(
        &format!(
            "Size: {:.2} MB -> {:.2} MB ({:.1}% reduction)",
            stats.input_mb(),
            stats.output_mb(),
            stats.reduction_percent()
        ),
        global.quiet,
    );
    for (tag, count) in &stats.removed_by_type {
        print_info(&format!("  {}: {} removed", tag, count), global.quiet);
    }
    if stats.long_lines_removed > 0 {
        print_info(
            &format!("  oversized lines: {} removed", stats.long_lines_removed),
            global.quiet,
        );
    }
    print_info(&format!("Output: {}", output.display()), global.quiet);

    Ok(())
}
