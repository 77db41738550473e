//! Split command - Partition a model into files

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ifcsplit_config::{ConfigOverrides, SplitConfig};
use ifcsplit_core::report::format_count;
use ifcsplit_core::{SplitEvent, SplitMethod, SplitRequest, Splitter};
use indicatif::ProgressBar;

use super::{print_info, print_warning};
use crate::progress;
use crate::GlobalOptions;

/// Arguments for the split command
#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Model to split
    input: PathBuf,

    /// Directory for the partition files and summary
    output_dir: PathBuf,

    /// Partitioning method (storeys, disciplines, chunks)
    #[arg(long, short = 'm', value_parser = parse_method)]
    method: Option<SplitMethod>,

    /// Remove annotations, grids and projections before splitting
    #[arg(long)]
    clean: bool,

    /// Elements per chunk (chunks method)
    #[arg(long, allow_negative_numbers = true)]
    max_elements: Option<i64>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

/// Parse split method from string
fn parse_method(s: &str) -> Result<SplitMethod, String> {
    s.parse()
}

impl SplitArgs {
    fn to_config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            method: self.method,
            max_elements: self.max_elements,
            clean: self.clean.then_some(true),
            ..Default::default()
        }
    }
}

/// Execute the split command
pub fn execute(args: SplitArgs, mut config: SplitConfig, global: GlobalOptions) -> Result<()> {
    config.apply_overrides(&args.to_config_overrides());

    let request = SplitRequest::new(&args.input, &args.output_dir, config.split.method)
        .with_clean(config.split.clean)
        .with_max_elements(config.split.max_elements);
    let splitter = Splitter::new(config.split_settings());

    let quiet = global.quiet || args.json;
    let mut spinner = progress::spinner(&format!("Reading {}", args.input.display()), quiet);
    let mut bar: Option<ProgressBar> = None;

    let result = splitter.run_with_progress(&request, &mut |event| match event {
        SplitEvent::Loaded { entities } => {
            if let Some(pb) = &spinner {
                pb.set_message(format!("Loaded {} entities", format_count(entities)));
            }
        }
        SplitEvent::Cleaned { removed } => {
            if let Some(pb) = &spinner {
                pb.set_message(format!("Removed {} entities", format_count(removed)));
            }
        }
        SplitEvent::Assigned { partitions } => {
            let message = format!("{} {} partitions", partitions, request.method);
            if partitions == 0 {
                progress::finish_spinner_warn(spinner.take(), &message);
            } else {
                progress::finish_spinner(spinner.take(), &message);
            }
            bar = progress::progress_bar(partitions as u64, "Writing", quiet);
        }
        SplitEvent::PartitionWritten { file, .. } => {
            if let Some(pb) = &bar {
                pb.set_message(file.name.clone());
                pb.inc(1);
            }
        }
        SplitEvent::PartitionSkipped { .. } => {
            if let Some(pb) = &bar {
                pb.inc(1);
            }
        }
    });

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            progress::finish_spinner_error(spinner.take(), "Split failed");
            progress::finish_progress(bar.take());
            return Err(e).with_context(|| format!("Failed to split {}", args.input.display()));
        }
    };
    progress::finish_progress(bar.take());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
        return Ok(());
    }

    if let Some(cleanup) = &outcome.cleanup {
        print_info(
            &format!(
                "Cleanup: removed {} entities, {} still referenced",
                format_count(cleanup.removed),
                format_count(cleanup.failed)
            ),
            global.quiet,
        );
    }
    if !outcome.skipped.is_empty() {
        print_info(
            &format!("Skipped (no elements): {}", outcome.skipped.join(", ")),
            global.quiet,
        );
    }
    for file in outcome.files.iter().filter(|f| f.failed_roots > 0) {
        print_warning(&format!(
            "{}: {} elements could not be included",
            file.name, file.failed_roots
        ));
    }

    if outcome.files.is_empty() {
        print_warning("No partition files were written");
    }
    if !global.quiet {
        print!("{}", outcome.report.render_table());
    }
    print_info(
        &format!("Summary saved to {}", outcome.report_path.display()),
        global.quiet,
    );

    Ok(())
}
