//! Streaming Preprocessor
//!
//! Line-oriented filter for files too large to load: copies the model to a
//! new file, dropping instances of excluded types and instance lines longer
//! than a limit. Never holds more than one line in memory. Header lines are
//! always kept; only the DATA section is filtered.
//!
//! The output may contain dangling references to dropped instances. Readers
//! of the output (including [`crate::step::read_model`]) tolerate them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Default line length limit in bytes
pub const DEFAULT_MAX_LINE_LEN: usize = 50_000;

/// Types dropped by default
pub const DEFAULT_EXCLUDED_TAGS: &[&str] = &[
    "IFCANNOTATION",
    "IFCGRID",
    "IFCGRIDAXIS",
    "IFCPROJECTIONELEMENT",
    "IFCSPACE",
    "IFCZONE",
];

const PROGRESS_INTERVAL: u64 = 100_000;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Errors that can occur during preprocessing
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("output would overwrite the input: {0}")]
    SameFile(PathBuf),
}

/// Filter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    /// Instance types to drop, matched case-insensitively on the exact keyword
    pub exclude_tags: Vec<String>,
    /// Drop instance lines longer than this
    pub max_line_len: usize,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            exclude_tags: DEFAULT_EXCLUDED_TAGS.iter().map(|t| t.to_string()).collect(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

/// Counters for one preprocessing run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessStats {
    pub lines_processed: u64,
    pub lines_kept: u64,
    pub lines_removed: u64,
    /// Dropped instances per excluded type
    pub removed_by_type: BTreeMap<String, u64>,
    /// Instances dropped for exceeding the line limit
    pub long_lines_removed: u64,
    pub input_bytes: u64,
    pub output_bytes: u64,
}

impl PreprocessStats {
    /// Size reduction in percent
    pub fn reduction_percent(&self) -> f64 {
        if self.input_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.output_bytes as f64 / self.input_bytes as f64) * 100.0
    }

    pub fn input_mb(&self) -> f64 {
        self.input_bytes as f64 / BYTES_PER_MB
    }

    pub fn output_mb(&self) -> f64 {
        self.output_bytes as f64 / BYTES_PER_MB
    }
}

/// Why a line is dropped
enum DropReason {
    Excluded(String),
    TooLong,
}

/// Streaming line filter
pub struct Preprocessor {
    exclude: Vec<String>,
    max_line_len: usize,
}

impl Preprocessor {
    pub fn new(options: &PreprocessOptions) -> Self {
        Self {
            exclude: options
                .exclude_tags
                .iter()
                .map(|t| t.to_ascii_uppercase())
                .collect(),
            max_line_len: options.max_line_len,
        }
    }

    /// Filter `input` into `output`
    pub fn run(&self, input: &Path, output: &Path) -> Result<PreprocessStats, PreprocessError> {
        if input == output {
            return Err(PreprocessError::SameFile(output.to_path_buf()));
        }
        let read_error = |source| PreprocessError::Io {
            path: input.to_path_buf(),
            source,
        };
        let write_error = |source| PreprocessError::Io {
            path: output.to_path_buf(),
            source,
        };

        info!("Preprocessing {} -> {}", input.display(), output.display());
        let reader = BufReader::new(File::open(input).map_err(read_error)?);
        let source = fs::canonicalize(input).map_err(read_error)?;
        if source == resolve_output(output).map_err(write_error)? {
            return Err(PreprocessError::SameFile(output.to_path_buf()));
        }
        let mut writer = BufWriter::new(File::create(output).map_err(write_error)?);

        let mut stats = self
            .filter(reader, &mut writer)
            .map_err(|(side, source)| match side {
                Side::Read => read_error(source),
                Side::Write => write_error(source),
            })?;
        writer.flush().map_err(write_error)?;
        drop(writer);

        stats.input_bytes = fs::metadata(input).map_err(read_error)?.len();
        stats.output_bytes = fs::metadata(output).map_err(write_error)?.len();

        info!(
            "Kept {} of {} lines ({:.1}% smaller)",
            stats.lines_kept,
            stats.lines_processed,
            stats.reduction_percent()
        );
        Ok(stats)
    }

    /// Filter a stream; I/O errors carry the side they came from
    fn filter<R: BufRead, W: Write>(
        &self,
        mut reader: R,
        writer: &mut W,
    ) -> Result<PreprocessStats, (Side, io::Error)> {
        let mut stats = PreprocessStats::default();
        let mut line = Vec::new();
        let mut in_data = false;
        // Inside a dropped instance that spans several lines
        let mut skipping = false;

        loop {
            line.clear();
            let n = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| (Side::Read, e))?;
            if n == 0 {
                break;
            }
            stats.lines_processed += 1;
            if stats.lines_processed % PROGRESS_INTERVAL == 0 {
                debug!("Processed {} lines", stats.lines_processed);
            }

            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim();

            if skipping {
                stats.lines_removed += 1;
                skipping = !trimmed.ends_with(';');
                continue;
            }

            let verdict = if in_data {
                self.verdict(trimmed, line.len())
            } else {
                None
            };

            match verdict {
                Some(reason) => {
                    stats.lines_removed += 1;
                    match reason {
                        DropReason::Excluded(tag) => {
                            *stats.removed_by_type.entry(tag).or_default() += 1
                        }
                        DropReason::TooLong => stats.long_lines_removed += 1,
                    }
                    skipping = !trimmed.ends_with(';');
                }
                None => {
                    if trimmed.eq_ignore_ascii_case("DATA;") {
                        in_data = true;
                    } else if trimmed.eq_ignore_ascii_case("ENDSEC;") {
                        in_data = false;
                    }
                    writer.write_all(&line).map_err(|e| (Side::Write, e))?;
                    stats.lines_kept += 1;
                }
            }
        }

        Ok(stats)
    }

    fn verdict(&self, trimmed: &str, len: usize) -> Option<DropReason> {
        let keyword = instance_keyword(trimmed)?;
        if let Some(tag) = self
            .exclude
            .iter()
            .find(|tag| tag.eq_ignore_ascii_case(keyword))
        {
            return Some(DropReason::Excluded(tag.clone()));
        }
        (len > self.max_line_len).then_some(DropReason::TooLong)
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Read,
    Write,
}

/// Type keyword of an instance line (`#12 = IFCWALL(...)` gives `IFCWALL`)
pub fn instance_keyword(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('#')?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = rest[digits..].trim_start().strip_prefix('=')?.trim_start();
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

/// Absolute path `output` refers to, following symlinks.
///
/// The file itself may not exist yet, so only its directory is resolved then.
fn resolve_output(output: &Path) -> io::Result<PathBuf> {
    if output.exists() {
        return fs::canonicalize(output);
    }
    let file_name = output
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "output has no file name"))?;
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(fs::canonicalize(parent)?.join(file_name))
}

/// Default output path: `<stem>_preprocessed.<ext>` next to the input
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    let extension = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ifc".to_string());
    input.with_file_name(format!("{}_preprocessed.{}", stem, extension))
}

/// Filter `input` into `output` with `options`
pub fn preprocess(
    input: &Path,
    output: &Path,
    options: &PreprocessOptions,
) -> Result<PreprocessStats, PreprocessError> {
    Preprocessor::new(options).run(input, output)
}
