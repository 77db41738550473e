//! Partition Strategies
//!
//! A strategy decides which source entities belong together. Each produces
//! an ordered list of [`Partition`]s naming their root entities, together
//! with the closure and context policies the builder should apply.
//!
//! - [`StoreyStrategy`]: one partition per building storey
//! - [`DisciplineStrategy`]: one partition per discipline of a type table
//! - [`ChunkStrategy`]: contiguous fixed-size slices of all products

mod chunk;
mod discipline;
mod storey;

pub use chunk::{chunk_name, ChunkStrategy, DEFAULT_MAX_ELEMENTS};
pub use discipline::{Discipline, DisciplineStrategy, DisciplineTable};
pub use storey::{LookupError, MembershipTier, StoreyLookup, StoreyStrategy};

use crate::closure::ClosurePolicy;
use crate::graph::{EntityGraph, EntityId, ReferenceKind};
use crate::splitter::SplitError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Methods and Kinds
// ============================================================================

/// Strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMethod {
    #[default]
    Storeys,
    Disciplines,
    Chunks,
}

impl SplitMethod {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitMethod::Storeys => "storeys",
            SplitMethod::Disciplines => "disciplines",
            SplitMethod::Chunks => "chunks",
        }
    }

    /// Kind of the partitions this method produces
    pub fn partition_kind(&self) -> PartitionKind {
        match self {
            SplitMethod::Storeys => PartitionKind::Storey,
            SplitMethod::Disciplines => PartitionKind::Discipline,
            SplitMethod::Chunks => PartitionKind::Chunk,
        }
    }
}

impl fmt::Display for SplitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "storeys" | "storey" | "floors" => Ok(SplitMethod::Storeys),
            "disciplines" | "discipline" => Ok(SplitMethod::Disciplines),
            "chunks" | "chunk" => Ok(SplitMethod::Chunks),
            _ => Err(format!(
                "Invalid split method: {}. Valid values: storeys, disciplines, chunks",
                s
            )),
        }
    }
}

/// Kind of a produced partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    Storey,
    Discipline,
    Chunk,
}

impl PartitionKind {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionKind::Storey => "storey",
            PartitionKind::Discipline => "discipline",
            PartitionKind::Chunk => "chunk",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Partitions
// ============================================================================

/// A named group of root entities destined for one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// File stem (already sanitized and unique within a run)
    pub name: String,
    /// Human-readable name the partition was derived from
    pub label: String,
    pub kind: PartitionKind,
    /// Assigned root entities, in assignment order, without duplicates
    pub roots: Vec<EntityId>,
    /// Entity the partition was derived from (the storey)
    pub anchor: Option<EntityId>,
}

impl Partition {
    /// Create a partition
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        kind: PartitionKind,
        roots: Vec<EntityId>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            roots,
            anchor: None,
        }
    }

    /// Attach the entity the partition was derived from
    pub fn with_anchor(mut self, anchor: EntityId) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Check whether the partition has no roots (and produces no file)
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Which shared entities are copied into every partition of a strategy.
///
/// Project, sites and buildings are always included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextPolicy {
    /// Additional type tags (with subtypes) replicated into every partition
    pub extra_tags: Vec<String>,
    /// Include each partition's anchor entity
    pub include_anchor: bool,
}

// ============================================================================
// Strategy Trait
// ============================================================================

/// Assigns source entities to named partitions.
pub trait PartitionStrategy {
    /// Kind of the partitions produced
    fn kind(&self) -> PartitionKind;

    /// Closure applied to every root
    fn closure_policy(&self) -> &ClosurePolicy;

    /// Shared context replicated into every partition
    fn context_policy(&self) -> ContextPolicy;

    /// Compute the partitions for a model, in output order
    fn assign(&self, graph: &EntityGraph) -> Result<Vec<Partition>, SplitError>;
}

/// Default closure for storey and discipline partitions
pub fn type_and_property_closure() -> ClosurePolicy {
    ClosurePolicy::new(
        crate::closure::DEFAULT_MAX_DEPTH,
        vec![
            ReferenceKind::TypeAssignment,
            ReferenceKind::PropertyAssociation,
        ],
    )
}

/// Make a display name safe for use as a file stem.
///
/// Keeps alphanumerics, spaces, hyphens and underscores, trims, then turns
/// each run of spaces into one underscore. May return an empty string.
pub fn sanitize_name(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.split(' ')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Claim a file-safe partition name, suffixing `_<tag>` and then a counter
/// until it no longer collides with a name already in `used`
pub fn claim_unique_name(
    used: &mut HashSet<String>,
    name: String,
    tag: impl fmt::Display,
) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let base = format!("{}_{}", name, tag);
    let mut candidate = base.clone();
    let mut counter = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{}_{}", base, counter);
        counter += 1;
    }
    candidate
}
