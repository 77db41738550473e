//! Chunk partitions: contiguous slices of every product in load order.

use super::{ContextPolicy, Partition, PartitionKind, PartitionStrategy};
use crate::closure::{ClosurePolicy, DEFAULT_MAX_DEPTH};
use crate::graph::{EntityGraph, EntityId, ReferenceKind};
use crate::schema::tags;
use crate::splitter::SplitError;
use std::num::NonZeroUsize;

/// Default number of roots per chunk
pub const DEFAULT_MAX_ELEMENTS: usize = 100_000;

/// Fixed-size partitions over all top-level elements
#[derive(Debug, Clone)]
pub struct ChunkStrategy {
    max_elements: NonZeroUsize,
    closure: ClosurePolicy,
}

impl ChunkStrategy {
    /// Create a chunk strategy; `max_elements` must be positive
    pub fn new(max_elements: i64, closure: ClosurePolicy) -> Result<Self, SplitError> {
        let max_elements = usize::try_from(max_elements)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or(SplitError::InvalidChunkSize(max_elements))?;
        Ok(Self {
            max_elements,
            closure,
        })
    }

    /// Create a chunk strategy with the default type-only closure
    pub fn with_max_elements(max_elements: i64) -> Result<Self, SplitError> {
        Self::new(max_elements, Self::default_closure())
    }

    /// Type assignments only, two levels deep
    pub fn default_closure() -> ClosurePolicy {
        ClosurePolicy::new(DEFAULT_MAX_DEPTH, vec![ReferenceKind::TypeAssignment])
    }

    /// Get the chunk size
    pub fn max_elements(&self) -> usize {
        self.max_elements.get()
    }

    /// Number of chunks produced for `total` elements
    pub fn chunk_count(&self, total: usize) -> usize {
        total.div_ceil(self.max_elements.get())
    }
}

/// Name of the chunk at a zero-based position, e.g. `chunk_001`
pub fn chunk_name(index: usize) -> String {
    format!("chunk_{:03}", index + 1)
}

impl PartitionStrategy for ChunkStrategy {
    fn kind(&self) -> PartitionKind {
        PartitionKind::Chunk
    }

    fn closure_policy(&self) -> &ClosurePolicy {
        &self.closure
    }

    fn context_policy(&self) -> ContextPolicy {
        ContextPolicy {
            extra_tags: vec![tags::BUILDING_STOREY.to_string()],
            include_anchor: false,
        }
    }

    fn assign(&self, graph: &EntityGraph) -> Result<Vec<Partition>, SplitError> {
        let elements: Vec<EntityId> = graph
            .entities_of_kind(tags::PRODUCT)
            .iter()
            .map(|e| e.id)
            .collect();

        Ok(elements
            .chunks(self.max_elements.get())
            .enumerate()
            .map(|(index, roots)| {
                Partition::new(
                    chunk_name(index),
                    format!("Chunk {}", index + 1),
                    PartitionKind::Chunk,
                    roots.to_vec(),
                )
            })
            .collect())
    }
}
