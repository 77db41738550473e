//! Split Reports
//!
//! Aggregates per-partition results into a [`SplitReport`], renders the
//! console table, and persists two files next to the partitions:
//! - `splitting_summary.txt`: human-readable summary
//! - `splitting_summary.json`: the same data plus checksums, for tooling

use crate::cleanup::CleanupReport;
use crate::graph::EntityGraph;
use crate::schema::tags;
use crate::strategy::{PartitionKind, SplitMethod};
use chrono::Local;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::info;

/// Text report file name
pub const SUMMARY_TEXT_FILE: &str = "splitting_summary.txt";

/// JSON report file name
pub const SUMMARY_JSON_FILE: &str = "splitting_summary.json";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Facts about the source model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Number of top-level elements (products)
    pub element_count: usize,
    pub entity_count: usize,
    pub schema: String,
}

impl SourceStats {
    /// Collect stats for a freshly loaded model
    pub fn collect(path: &Path, graph: &EntityGraph) -> io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            size_bytes: fs::metadata(path)?.len(),
            element_count: graph.entities_of_kind(tags::PRODUCT).len(),
            entity_count: graph.len(),
            schema: graph.schema().to_string(),
        })
    }

    /// Size in megabytes
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_MB
    }
}

/// One written partition file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionFile {
    /// File name, e.g. `Level_1.ifc`
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Roots inserted into the partition
    pub element_count: usize,
    /// All entities written, context and dependencies included
    pub entity_count: usize,
    pub kind: PartitionKind,
    /// Name the partition was derived from (storey or discipline name)
    pub partition_name: String,
    pub failed_roots: usize,
    pub failed_dependencies: usize,
    pub sha256: String,
}

impl PartitionFile {
    /// Size in megabytes
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_MB
    }
}

/// Summary of one split run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitReport {
    pub source: SourceStats,
    pub method: SplitMethod,
    /// Local time, `%Y-%m-%d %H:%M:%S`
    pub generated_at: String,
    pub files: Vec<PartitionFile>,
    pub total_size_bytes: u64,
    pub total_elements: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupReport>,
}

/// Builds [`SplitReport`]s
pub struct ReportGenerator;

impl ReportGenerator {
    /// Aggregate partition results, stamped with the current local time
    pub fn summarize(
        source: SourceStats,
        files: Vec<PartitionFile>,
        method: SplitMethod,
    ) -> SplitReport {
        let generated_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        Self::summarize_at(source, files, method, generated_at)
    }

    /// Aggregate partition results with an explicit timestamp
    pub fn summarize_at(
        source: SourceStats,
        files: Vec<PartitionFile>,
        method: SplitMethod,
        generated_at: String,
    ) -> SplitReport {
        SplitReport {
            total_size_bytes: files.iter().map(|f| f.size_bytes).sum(),
            total_elements: files.iter().map(|f| f.element_count).sum(),
            source,
            method,
            generated_at,
            files,
            cleanup: None,
        }
    }
}

impl SplitReport {
    /// Attach the result of a cleanup pass
    pub fn with_cleanup(mut self, cleanup: Option<CleanupReport>) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Total size of all partition files in megabytes
    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / BYTES_PER_MB
    }

    /// Console summary table
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Method: {}", self.method);
        let _ = writeln!(
            out,
            "Original file: {:.2} MB, {} elements",
            self.source.size_mb(),
            format_count(self.source.element_count)
        );
        let _ = writeln!(out, "Split into: {} files", self.files.len());
        let _ = writeln!(out, "Total split size: {:.2} MB", self.total_size_mb());
        let _ = writeln!(
            out,
            "Total split elements: {}",
            format_count(self.total_elements)
        );
        if !self.files.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Split files:");
            for (i, file) in self.files.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "  {:>2}. {:<30} {:>8.2} MB  {:>8} elements",
                    i + 1,
                    file.name,
                    file.size_mb(),
                    format_count(file.element_count)
                );
            }
        }
        out
    }

    /// Plain-text report persisted next to the partitions
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "IFC File Splitting Summary");
        let _ = writeln!(out, "=========================");
        let _ = writeln!(out);
        let _ = writeln!(out, "Original file: {}", self.source.path.display());
        let _ = writeln!(out, "Original size: {:.2} MB", self.source.size_mb());
        let _ = writeln!(
            out,
            "Original elements: {}",
            format_count(self.source.element_count)
        );
        let _ = writeln!(out, "Splitting method: {}", self.method);
        let _ = writeln!(out, "Split date: {}", self.generated_at);
        let _ = writeln!(out);
        let _ = writeln!(out, "Split files ({} total):", self.files.len());
        for file in &self.files {
            let _ = writeln!(
                out,
                "  {}: {:.2} MB, {} elements",
                file.name,
                file.size_mb(),
                format_count(file.element_count)
            );
        }
        out
    }

    /// Write the text and JSON reports into `dir`; returns the text report path
    pub fn write(&self, dir: &Path) -> io::Result<PathBuf> {
        let text_path = dir.join(SUMMARY_TEXT_FILE);
        fs::write(&text_path, self.render_text())?;

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(dir.join(SUMMARY_JSON_FILE), json)?;

        info!("Summary saved to {}", text_path.display());
        Ok(text_path)
    }
}

/// SHA-256 of a file's contents, hex encoded
pub fn compute_file_hash(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(8192, file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        match reader.read(&mut buffer)? {
            0 => break,
            n => hasher.update(&buffer[..n]),
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Format a count with thousands separators (`1234567` → `1,234,567`)
pub fn format_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn source() -> SourceStats {
        SourceStats {
            path: PathBuf::from("/models/tower.ifc"),
            size_bytes: 3 * 1024 * 1024,
            element_count: 12_345,
            entity_count: 400_000,
            schema: "IFC2X3".to_string(),
        }
    }

    fn file(name: &str, size_bytes: u64, element_count: usize) -> PartitionFile {
        PartitionFile {
            name: name.to_string(),
            path: PathBuf::from(name),
            size_bytes,
            element_count,
            entity_count: element_count * 10,
            kind: PartitionKind::Storey,
            partition_name: name.trim_end_matches(".ifc").to_string(),
            failed_roots: 0,
            failed_dependencies: 0,
            sha256: String::new(),
        }
    }

    fn report() -> SplitReport {
        ReportGenerator::summarize_at(
            source(),
            vec![
                file("Level_1.ifc", 1024 * 1024, 1_500),
                file("Level_2.ifc", 512 * 1024, 700),
            ],
            SplitMethod::Storeys,
            "2024-05-01 12:00:00".to_string(),
        )
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    #[test]
    fn test_summarize_totals() {
        let report = report();
        assert_eq!(report.total_size_bytes, 1024 * 1024 + 512 * 1024);
        assert_eq!(report.total_elements, 2_200);
        assert!((report.total_size_mb() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_render_text() {
        let expected = "\
IFC File Splitting Summary
=========================

Original file: /models/tower.ifc
Original size: 3.00 MB
Original elements: 12,345
Splitting method: storeys
Split date: 2024-05-01 12:00:00

Split files (2 total):
  Level_1.ifc: 1.00 MB, 1,500 elements
  Level_2.ifc: 0.50 MB, 700 elements
";
        assert_eq!(report().render_text(), expected);
    }

    #[test]
    fn test_render_table_lists_files() {
        let table = report().render_table();
        assert!(table.contains("Split into: 2 files"));
        assert!(table.contains("Total split elements: 2,200"));
        assert!(table.contains("   1. Level_1.ifc"));
    }

    #[test]
    fn test_write_persists_text_and_json() {
        let dir = TempDir::new().unwrap();
        let path = report().write(dir.path()).unwrap();

        assert_eq!(path, dir.path().join(SUMMARY_TEXT_FILE));
        let json = fs::read_to_string(dir.path().join(SUMMARY_JSON_FILE)).unwrap();
        let parsed: SplitReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report());
    }

    #[test]
    fn test_compute_file_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            compute_file_hash(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
