//! ifcsplit Core - Partitioning engine for large IFC building models
//!
//! This crate provides the core functionality for splitting a model into
//! smaller, independently valid files:
//! - STEP physical file reading and writing
//! - Typed entity graph with relationship-aware traversal
//! - Storey, discipline and chunk partitioning strategies
//! - Bounded dependency closure and partition assembly
//! - Cleanup of non-essential entities
//! - Split reports, quick diagnosis and streaming preprocessing

pub mod builder;
pub mod cleanup;
pub mod closure;
pub mod diagnose;
pub mod graph;
pub mod preprocess;
pub mod report;
pub mod schema;
pub mod splitter;
pub mod step;
pub mod strategy;
pub mod subgraph;

// Graph re-exports
pub use graph::{
    EdgeData, Entity, EntityGraph, EntityId, GraphError, ReferenceKind, RemoveError, Value,
};
pub use schema::{tags, RelationRule, RelationSchema, SchemaVocabulary, TypeTag};
pub use step::{parse_str, read_model, StepError, StepHeader, TextEncoding};
pub use subgraph::{AddOutcome, InsertError, Subgraph};

// Partitioning re-exports
pub use builder::{BuildOutcome, ContextSet, FailureStage, InsertFailure, PartitionBuilder};
pub use closure::{closure, ClosurePolicy, DEFAULT_MAX_DEPTH};
pub use strategy::{
    ChunkStrategy, ContextPolicy, Discipline, DisciplineStrategy, DisciplineTable,
    MembershipTier, Partition, PartitionKind, PartitionStrategy, SplitMethod, StoreyLookup,
    StoreyStrategy, DEFAULT_MAX_ELEMENTS,
};

// Run re-exports
pub use cleanup::{clean, CleanupCategory, CleanupOptions, CleanupReport};
pub use report::{compute_file_hash, PartitionFile, ReportGenerator, SourceStats, SplitReport};
pub use splitter::{
    SplitError, SplitEvent, SplitOutcome, SplitRequest, SplitSettings, Splitter,
};

// Tooling re-exports
pub use diagnose::{diagnose, Complexity, DiagnoseError, Diagnosis, DEFAULT_SAMPLE_BYTES};
pub use preprocess::{
    default_output_path, preprocess, PreprocessError, PreprocessOptions, PreprocessStats,
    Preprocessor,
};
