//! Dependency Closure
//!
//! Expands a root entity into the set of definitions it should travel with:
//! its type object, property sets and material, reached through the
//! relationship entities that link them. The traversal is bounded by depth
//! and edge kind. Anything reachable only beyond `max_depth` is left out,
//! even when that leaves the partition referentially incomplete; references
//! to left-out entities are pruned when the partition is written.

use crate::graph::{EntityGraph, EntityId, ReferenceKind};
use serde::{Deserialize, Serialize};

/// Default traversal depth: one hop to the relationship, one to the definition
pub const DEFAULT_MAX_DEPTH: usize = 2;

/// Depth bound and edge kinds followed when expanding a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClosurePolicy {
    pub max_depth: usize,
    pub edge_kinds: Vec<ReferenceKind>,
}

impl Default for ClosurePolicy {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            edge_kinds: vec![
                ReferenceKind::TypeAssignment,
                ReferenceKind::PropertyAssociation,
                ReferenceKind::MaterialAssociation,
            ],
        }
    }
}

impl ClosurePolicy {
    /// Create a policy
    pub fn new(max_depth: usize, edge_kinds: Vec<ReferenceKind>) -> Self {
        Self {
            max_depth,
            edge_kinds,
        }
    }

    /// Check whether the policy follows an edge kind
    pub fn follows(&self, kind: ReferenceKind) -> bool {
        self.edge_kinds.contains(&kind)
    }
}

/// Entities reachable from `root` under `policy`, root first, without
/// duplicates.
///
/// A root missing from the graph yields just the root; unset slots simply
/// contribute no edges.
pub fn closure(graph: &EntityGraph, root: EntityId, policy: &ClosurePolicy) -> Vec<EntityId> {
    graph.traverse(root, policy.max_depth, &policy.edge_kinds)
}
