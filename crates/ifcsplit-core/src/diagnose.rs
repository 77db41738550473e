//! Model Diagnosis
//!
//! Quick assessment of a model file without loading it: reads a leading
//! sample, counts instance types there, and extrapolates to the whole file
//! by the sampled fraction. Used to decide whether a file needs
//! preprocessing or splitting before conversion.

use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bytes read from the start of the file
pub const DEFAULT_SAMPLE_BYTES: usize = 1024 * 1024;

/// Lines longer than this usually hold huge mesh data
pub const LONG_LINE_THRESHOLD: usize = 10_000;

/// Entity types listed in the summary
pub const TOP_TYPE_COUNT: usize = 8;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const VERY_HIGH_THRESHOLD_MB: f64 = 1000.0;
const EXTREME_THRESHOLD_MB: f64 = 3000.0;
const HIGH_ENTITY_COUNT: u64 = 10_000_000;
const HIGH_TRIANGULATED_COUNT: usize = 100;

/// Errors that can occur during diagnosis
#[derive(Debug, Error)]
pub enum DiagnoseError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scan pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Processing difficulty by file size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Medium,
    VeryHigh,
    Extreme,
}

impl Complexity {
    /// Grade a file size
    pub fn from_size_mb(size_mb: f64) -> Self {
        if size_mb > EXTREME_THRESHOLD_MB {
            Complexity::Extreme
        } else if size_mb > VERY_HIGH_THRESHOLD_MB {
            Complexity::VeryHigh
        } else {
            Complexity::Medium
        }
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            Complexity::Medium => "Medium",
            Complexity::VeryHigh => "Very High",
            Complexity::Extreme => "Extreme",
        }
    }

    /// Peak memory as a multiple of file size
    pub fn memory_factor(&self) -> f64 {
        match self {
            Complexity::Medium => 4.0,
            Complexity::VeryHigh => 6.0,
            Complexity::Extreme => 8.0,
        }
    }
}

/// A count observed in the sample and its whole-file estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SampledCount {
    pub sample: usize,
    pub estimated: u64,
}

/// Per-type sample count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeCount {
    pub type_tag: String,
    pub count: SampledCount,
}

/// Counts of geometry-heavy instance types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GeometryIndicators {
    pub poly_loops: SampledCount,
    pub cartesian_points: SampledCount,
    pub triangulated_face_sets: SampledCount,
    pub faceted_breps: SampledCount,
}

/// Result of diagnosing a file
#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<String>,
    pub sample_bytes: usize,
    /// Sampled fraction of the file (0..=1)
    pub sample_ratio: f64,
    pub description: Option<String>,
    pub schema: Option<String>,
    pub entities: SampledCount,
    pub top_types: Vec<TypeCount>,
    pub geometry: GeometryIndicators,
    pub long_lines: usize,
    pub complexity: Complexity,
    pub memory_estimate_mb: u64,
    pub recommendations: Vec<String>,
    pub suggested_steps: Vec<String>,
}

impl Diagnosis {
    /// File size in megabytes
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_MB
    }

    /// Human-readable report
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== IFC FILE ANALYSIS ===");
        let _ = writeln!(out, "File: {}", self.path.display());
        let _ = writeln!(
            out,
            "Size: {:.2} MB ({:.3} GB)",
            self.size_mb(),
            self.size_mb() / 1024.0
        );
        if let Some(modified) = &self.modified {
            let _ = writeln!(out, "Modified: {}", modified);
        }

        let _ = writeln!(out, "\n[HEADER]");
        if let Some(description) = &self.description {
            let _ = writeln!(out, "Description: {}", description);
        }
        if let Some(schema) = &self.schema {
            let _ = writeln!(out, "Schema: {}", schema);
        }

        let _ = writeln!(out, "\n[ENTITIES]");
        let _ = writeln!(
            out,
            "Sample entities: {} ({:.2}% of file)",
            self.entities.sample,
            self.sample_ratio * 100.0
        );
        let _ = writeln!(out, "Estimated total: {}", self.entities.estimated);

        let _ = writeln!(out, "\n[TOP ENTITY TYPES]");
        for entry in &self.top_types {
            let _ = writeln!(
                out,
                "  {}: {} (est. {})",
                entry.type_tag, entry.count.sample, entry.count.estimated
            );
        }

        let _ = writeln!(out, "\n[GEOMETRY COMPLEXITY]");
        let geometry = [
            ("PolyLoops", self.geometry.poly_loops),
            ("CartesianPoints", self.geometry.cartesian_points),
            ("TriangulatedFaceSets", self.geometry.triangulated_face_sets),
            ("FacetedBreps", self.geometry.faceted_breps),
        ];
        for (label, count) in geometry {
            let _ = writeln!(out, "  {}: {} (est. {})", label, count.sample, count.estimated);
        }

        let _ = writeln!(out, "\n[PROCESSING ASSESSMENT]");
        let _ = writeln!(out, "Complexity: {}", self.complexity.label());
        let _ = writeln!(out, "Memory estimate: {} MB", self.memory_estimate_mb);

        if !self.recommendations.is_empty() {
            let _ = writeln!(out, "\n[RECOMMENDATIONS]");
            for recommendation in &self.recommendations {
                let _ = writeln!(out, "  - {}", recommendation);
            }
        }

        let _ = writeln!(out, "\n[SUGGESTED STRATEGY]");
        for (i, step) in self.suggested_steps.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, step);
        }
        out
    }
}

/// Diagnose a file from its first `sample_bytes` bytes
pub fn diagnose(path: &Path, sample_bytes: usize) -> Result<Diagnosis, DiagnoseError> {
    let io_error = |source| DiagnoseError::Io {
        path: path.to_path_buf(),
        source,
    };

    let metadata = fs::metadata(path).map_err(io_error)?;
    let modified = metadata
        .modified()
        .ok()
        .map(|time| DateTime::<Local>::from(time).to_rfc3339());

    let mut sample = Vec::with_capacity(sample_bytes.min(metadata.len() as usize));
    File::open(path)
        .map_err(io_error)?
        .take(sample_bytes as u64)
        .read_to_end(&mut sample)
        .map_err(io_error)?;

    let text = String::from_utf8_lossy(&sample);
    let mut diagnosis = analyze_sample(&text, sample.len(), metadata.len())?;
    diagnosis.path = path.to_path_buf();
    diagnosis.modified = modified;
    Ok(diagnosis)
}

/// Analyze a leading sample of `sample_len` bytes from a file of `file_size` bytes
pub fn analyze_sample(
    text: &str,
    sample_len: usize,
    file_size: u64,
) -> Result<Diagnosis, DiagnoseError> {
    let description_re = Regex::new(r"(?s)FILE_DESCRIPTION\s*\(\s*\((.*?)\)")?;
    let schema_re = Regex::new(r"(?s)FILE_SCHEMA\s*\(\s*\((.*?)\)")?;
    let instance_re = Regex::new(r"#\d+\s*=\s*(IFC\w+)")?;

    let clean = |m: &str| m.replace('\'', "").trim().to_string();
    let description = description_re
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| clean(m.as_str()));
    let schema = schema_re
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| clean(m.as_str()));

    let sample_ratio = if file_size == 0 {
        1.0
    } else {
        (sample_len as f64 / file_size as f64).min(1.0)
    };
    let estimate = |sample: usize| SampledCount {
        sample,
        estimated: if sample_ratio > 0.0 {
            (sample as f64 / sample_ratio).round() as u64
        } else {
            0
        },
    };

    let mut type_counts: HashMap<&str, usize> = HashMap::new();
    let mut total = 0;
    for captures in instance_re.captures_iter(text) {
        if let Some(tag) = captures.get(1) {
            *type_counts.entry(tag.as_str()).or_default() += 1;
            total += 1;
        }
    }

    let mut sorted: Vec<(&str, usize)> = type_counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let top_types = sorted
        .into_iter()
        .take(TOP_TYPE_COUNT)
        .map(|(tag, count)| TypeCount {
            type_tag: tag.to_string(),
            count: estimate(count),
        })
        .collect();

    let occurrences = |needle: &str| text.matches(needle).count();
    let geometry = GeometryIndicators {
        poly_loops: estimate(occurrences("IFCPOLYLOOP")),
        cartesian_points: estimate(occurrences("IFCCARTESIANPOINT")),
        triangulated_face_sets: estimate(occurrences("IFCTRIANGULATEDFACESET")),
        faceted_breps: estimate(occurrences("IFCFACETEDBREP")),
    };

    let long_lines = text
        .lines()
        .filter(|line| line.len() > LONG_LINE_THRESHOLD)
        .count();

    let size_mb = file_size as f64 / BYTES_PER_MB;
    let complexity = Complexity::from_size_mb(size_mb);
    let entities = estimate(total);

    let mut recommendations = Vec::new();
    match complexity {
        Complexity::Extreme => {
            recommendations.push("File exceeds 3 GB: preprocess before conversion".to_string());
            recommendations.push("Estimated memory needed: 24-32 GB".to_string());
            recommendations.push("Strip non-essential entities before conversion".to_string());
            recommendations.push("Consider splitting or chunked processing".to_string());
        }
        Complexity::VeryHigh => {
            recommendations.push("Large file: use memory-optimized processing".to_string());
            recommendations.push("Estimated memory needed: 6-12 GB".to_string());
            recommendations.push("Consider preprocessing to reduce size".to_string());
        }
        Complexity::Medium => {}
    }
    if entities.estimated > HIGH_ENTITY_COUNT {
        recommendations.push(format!(
            "Very high entity count ({}): conversions may time out",
            entities.estimated
        ));
    }
    if geometry.triangulated_face_sets.sample > HIGH_TRIANGULATED_COUNT {
        recommendations.push("Complex triangulated meshes detected: high memory usage".to_string());
    }
    if long_lines > 0 {
        recommendations.push(format!(
            "{} extremely long lines detected: possible huge mesh data",
            long_lines
        ));
    }

    let suggested_steps = match complexity {
        Complexity::Extreme => vec![
            "Preprocess the file (ifcsplit preprocess)",
            "Strip annotations, grids, spaces and zones",
            "Filter oversized mesh lines",
            "Allocate 16+ GB of memory",
            "Split into chunks if conversion still fails",
        ],
        Complexity::VeryHigh => vec![
            "Use a memory-optimized converter",
            "Allocate 8-16 GB of memory",
            "Split by storey or discipline (ifcsplit split)",
        ],
        Complexity::Medium => vec![
            "Standard conversion should work",
            "Allocate 4-8 GB of memory",
        ],
    }
    .into_iter()
    .map(String::from)
    .collect();

    Ok(Diagnosis {
        path: PathBuf::new(),
        size_bytes: file_size,
        modified: None,
        sample_bytes: sample_len,
        sample_ratio,
        description,
        schema,
        entities,
        top_types,
        geometry,
        long_lines,
        complexity,
        memory_estimate_mb: (size_mb * complexity.memory_factor()).round() as u64,
        recommendations,
        suggested_steps,
    })
}
