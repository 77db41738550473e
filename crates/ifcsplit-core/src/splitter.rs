//! Split Runs
//!
//! [`Splitter::run`] is the entry point for one split:
//!
//! ```text
//! read model → cleanup (optional) → context check → assign → build + write
//! each partition → summary report
//! ```
//!
//! Only the preconditions are fatal (unreadable model, missing project,
//! invalid chunk size), plus I/O failures on the output directory.
//! Per-entity failures are counted and per-partition emptiness is skipped.

use crate::builder::{ContextSet, PartitionBuilder};
use crate::cleanup::{self, CleanupOptions, CleanupReport};
use crate::closure::ClosurePolicy;
use crate::graph::EntityGraph;
use crate::report::{compute_file_hash, PartitionFile, ReportGenerator, SourceStats, SplitReport};
use crate::step::{self, StepError};
use crate::strategy::{
    ChunkStrategy, DisciplineStrategy, DisciplineTable, Partition, PartitionStrategy,
    SplitMethod, StoreyLookup, StoreyStrategy, DEFAULT_MAX_ELEMENTS,
};
use crate::subgraph::size_on_disk;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Extension of written partition files
pub const PARTITION_EXTENSION: &str = "ifc";

/// Fatal errors of a split run
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("failed to open source model: {0}")]
    Open(#[from] StepError),

    #[error("source model has no IFCPROJECT entity")]
    MissingProject,

    #[error("invalid chunk size {0}: must be a positive integer")]
    InvalidChunkSize(i64),

    #[error("failed to create output directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write partition '{name}' to '{path}': {source}")]
    WritePartition {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write summary report: {0}")]
    Report(#[source] io::Error),
}

/// Policy data shared by every run of a [`Splitter`]
#[derive(Debug, Clone)]
pub struct SplitSettings {
    pub storey_lookup: StoreyLookup,
    pub disciplines: DisciplineTable,
    pub storey_closure: ClosurePolicy,
    pub discipline_closure: ClosurePolicy,
    pub chunk_closure: ClosurePolicy,
    pub cleanup: CleanupOptions,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            storey_lookup: StoreyLookup::default(),
            disciplines: DisciplineTable::default(),
            storey_closure: crate::strategy::type_and_property_closure(),
            discipline_closure: crate::strategy::type_and_property_closure(),
            chunk_closure: ChunkStrategy::default_closure(),
            cleanup: CleanupOptions::default(),
        }
    }
}

/// Inputs of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub method: SplitMethod,
    /// Run the cleanup pass before partitioning
    pub clean: bool,
    /// Chunk size (chunks method only)
    pub max_elements: i64,
}

impl SplitRequest {
    /// Create a request with cleanup off and the default chunk size
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, method: SplitMethod) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            method,
            clean: false,
            max_elements: DEFAULT_MAX_ELEMENTS as i64,
        }
    }

    /// Enable or disable the cleanup pass
    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    /// Set the chunk size
    pub fn with_max_elements(mut self, max_elements: i64) -> Self {
        self.max_elements = max_elements;
        self
    }
}

/// Progress notifications emitted during a run
#[derive(Debug, Clone, Copy)]
pub enum SplitEvent<'a> {
    Loaded { entities: usize },
    Cleaned { removed: usize },
    Assigned { partitions: usize },
    PartitionWritten { index: usize, total: usize, file: &'a PartitionFile },
    PartitionSkipped { index: usize, total: usize, name: &'a str },
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub files: Vec<PartitionFile>,
    pub report: SplitReport,
    pub report_path: PathBuf,
    /// Labels of partitions that had no elements
    pub skipped: Vec<String>,
    pub cleanup: Option<CleanupReport>,
}

/// Files written for one model and strategy
#[derive(Debug, Clone, Default)]
pub struct PartitionRun {
    pub files: Vec<PartitionFile>,
    pub skipped: Vec<String>,
}

/// Runs splits with a fixed set of policies
#[derive(Debug, Clone, Default)]
pub struct Splitter {
    settings: SplitSettings,
}

impl Splitter {
    /// Create a splitter
    pub fn new(settings: SplitSettings) -> Self {
        Self { settings }
    }

    /// Get the settings
    pub fn settings(&self) -> &SplitSettings {
        &self.settings
    }

    /// Instantiate the strategy for a method
    pub fn strategy(
        &self,
        method: SplitMethod,
        max_elements: i64,
    ) -> Result<Box<dyn PartitionStrategy>, SplitError> {
        Ok(match method {
            SplitMethod::Storeys => Box::new(StoreyStrategy::new(
                self.settings.storey_lookup.clone(),
                self.settings.storey_closure.clone(),
            )),
            SplitMethod::Disciplines => Box::new(DisciplineStrategy::new(
                self.settings.disciplines.clone(),
                self.settings.discipline_closure.clone(),
            )),
            SplitMethod::Chunks => Box::new(ChunkStrategy::new(
                max_elements,
                self.settings.chunk_closure.clone(),
            )?),
        })
    }

    /// Run a split
    pub fn run(&self, request: &SplitRequest) -> Result<SplitOutcome, SplitError> {
        self.run_with_progress(request, &mut |_| {})
    }

    /// Run a split, reporting progress through `progress`
    pub fn run_with_progress(
        &self,
        request: &SplitRequest,
        progress: &mut dyn FnMut(SplitEvent<'_>),
    ) -> Result<SplitOutcome, SplitError> {
        // Configuration errors surface before the (possibly huge) model is read
        let strategy = self.strategy(request.method, request.max_elements)?;

        let mut graph = step::read_model(&request.input)?;
        let source = SourceStats::collect(&request.input, &graph).map_err(|source| {
            StepError::Io {
                path: request.input.clone(),
                source,
            }
        })?;
        progress(SplitEvent::Loaded {
            entities: graph.len(),
        });

        let cleanup = if request.clean {
            let report = cleanup::clean(&mut graph, &self.settings.cleanup);
            info!(
                "Cleanup removed {} entities ({} still referenced)",
                report.removed, report.failed
            );
            progress(SplitEvent::Cleaned {
                removed: report.removed,
            });
            Some(report)
        } else {
            None
        };

        fs::create_dir_all(&request.output_dir).map_err(|source| SplitError::OutputDir {
            path: request.output_dir.clone(),
            source,
        })?;

        let run = self.write_partitions(&graph, strategy.as_ref(), &request.output_dir, progress)?;

        let report = ReportGenerator::summarize(source, run.files.clone(), request.method)
            .with_cleanup(cleanup.clone());
        let report_path = report
            .write(&request.output_dir)
            .map_err(SplitError::Report)?;

        Ok(SplitOutcome {
            files: run.files,
            report,
            report_path,
            skipped: run.skipped,
            cleanup,
        })
    }

    /// Assign, build and write every partition of a loaded model.
    ///
    /// The project precondition is checked once, before any partition is
    /// built. Partitions without roots are skipped.
    pub fn write_partitions(
        &self,
        graph: &EntityGraph,
        strategy: &dyn PartitionStrategy,
        output_dir: &Path,
        progress: &mut dyn FnMut(SplitEvent<'_>),
    ) -> Result<PartitionRun, SplitError> {
        let context = ContextSet::resolve(graph, &strategy.context_policy())?;
        let partitions = strategy.assign(graph)?;
        info!(
            "Assigned {} {} partitions",
            partitions.len(),
            strategy.kind()
        );
        progress(SplitEvent::Assigned {
            partitions: partitions.len(),
        });

        let builder = PartitionBuilder::new(graph, context, strategy.closure_policy().clone());
        let total = partitions.len();
        let mut run = PartitionRun::default();

        for (index, partition) in partitions.iter().enumerate() {
            if partition.is_empty() {
                info!("Skipping '{}': no elements", partition.label);
                progress(SplitEvent::PartitionSkipped {
                    index,
                    total,
                    name: &partition.label,
                });
                run.skipped.push(partition.label.clone());
                continue;
            }

            let file = self.write_partition(&builder, partition, output_dir)?;
            progress(SplitEvent::PartitionWritten {
                index,
                total,
                file: &file,
            });
            run.files.push(file);
        }

        Ok(run)
    }

    fn write_partition(
        &self,
        builder: &PartitionBuilder<'_>,
        partition: &Partition,
        output_dir: &Path,
    ) -> Result<PartitionFile, SplitError> {
        let outcome = builder.build(partition);
        let name = format!("{}.{}", partition.name, PARTITION_EXTENSION);
        let path = output_dir.join(&name);
        let write_error = |source: io::Error| SplitError::WritePartition {
            name: partition.name.clone(),
            path: path.clone(),
            source,
        };

        outcome.subgraph.write(&path).map_err(write_error)?;
        let size_bytes = size_on_disk(&path).map_err(write_error)?;
        let sha256 = compute_file_hash(&path).map_err(write_error)?;

        if outcome.failed() > 0 && !outcome.all_roots_failed() {
            warn!(
                "'{}': {} of {} roots and {} dependencies failed to insert",
                partition.label,
                outcome.failed_roots,
                partition.roots.len(),
                outcome.failed_dependencies
            );
        }

        let file = PartitionFile {
            name,
            path,
            size_bytes,
            element_count: outcome.added,
            entity_count: outcome.subgraph.len(),
            kind: partition.kind,
            partition_name: partition.label.clone(),
            failed_roots: outcome.failed_roots,
            failed_dependencies: outcome.failed_dependencies,
            sha256,
        };
        info!(
            "Saved {} ({:.2} MB, {} elements)",
            file.name,
            file.size_mb(),
            file.element_count
        );
        Ok(file)
    }
}
