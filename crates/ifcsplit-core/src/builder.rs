//! Partition Builder
//!
//! Materializes one [`Subgraph`] per partition:
//! 1. seed the shared context (project, sites, buildings, plus whatever the
//!    strategy's [`ContextPolicy`] adds)
//! 2. insert every root
//! 3. insert the closure of every root that made it in
//!
//! Every insertion is its own `Result`. Failures are counted in the
//! [`BuildOutcome`] and never abort the build.

use crate::closure::{closure, ClosurePolicy};
use crate::graph::{EntityGraph, EntityId};
use crate::schema::tags;
use crate::splitter::SplitError;
use crate::strategy::{ContextPolicy, Partition};
use crate::subgraph::{InsertError, Subgraph};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Failure details kept per partition; counts are always exact
pub const MAX_RECORDED_FAILURES: usize = 256;

/// Entities replicated into every partition of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSet {
    project: EntityId,
    /// Context ids in insertion order, project first
    members: Vec<EntityId>,
    include_anchor: bool,
}

impl ContextSet {
    /// Resolve the context for a model.
    ///
    /// Fails with [`SplitError::MissingProject`] when the model has no
    /// project entity.
    pub fn resolve(graph: &EntityGraph, policy: &ContextPolicy) -> Result<Self, SplitError> {
        let project = graph
            .entities_of_kind(tags::PROJECT)
            .first()
            .map(|e| e.id)
            .ok_or(SplitError::MissingProject)?;

        let mut seen = HashSet::from([project]);
        let mut members = vec![project];
        let tag_list = [tags::SITE, tags::BUILDING]
            .into_iter()
            .chain(policy.extra_tags.iter().map(String::as_str));
        for tag in tag_list {
            for entity in graph.entities_of_kind(tag) {
                if seen.insert(entity.id) {
                    members.push(entity.id);
                }
            }
        }

        debug!("Context set: {} entities", members.len());
        Ok(Self {
            project,
            members,
            include_anchor: policy.include_anchor,
        })
    }

    /// Get the project entity
    pub fn project(&self) -> EntityId {
        self.project
    }

    /// Context entities in insertion order
    pub fn members(&self) -> &[EntityId] {
        &self.members
    }
}

/// Where in the build an insertion failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Context,
    Root,
    /// Closure member of the given root
    Dependency { root: EntityId },
}

/// One failed insertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertFailure {
    pub entity: EntityId,
    pub stage: FailureStage,
    pub error: InsertError,
}

/// Result of building one partition
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub subgraph: Subgraph,
    /// Roots inserted (including roots already present as context)
    pub added: usize,
    pub failed_context: usize,
    pub failed_roots: usize,
    pub failed_dependencies: usize,
    /// First [`MAX_RECORDED_FAILURES`] failures
    pub failures: Vec<InsertFailure>,
}

impl BuildOutcome {
    fn new(subgraph: Subgraph) -> Self {
        Self {
            subgraph,
            added: 0,
            failed_context: 0,
            failed_roots: 0,
            failed_dependencies: 0,
            failures: Vec::new(),
        }
    }

    /// Total failed insertions
    pub fn failed(&self) -> usize {
        self.failed_context + self.failed_roots + self.failed_dependencies
    }

    /// Check whether roots were assigned and none could be inserted
    pub fn all_roots_failed(&self) -> bool {
        self.added == 0 && self.failed_roots > 0
    }

    fn record(&mut self, entity: EntityId, stage: FailureStage, error: InsertError) {
        debug!("Failed to insert {} ({:?}): {}", entity, stage, error);
        match stage {
            FailureStage::Context => self.failed_context += 1,
            FailureStage::Root => self.failed_roots += 1,
            FailureStage::Dependency { .. } => self.failed_dependencies += 1,
        }
        if self.failures.len() < MAX_RECORDED_FAILURES {
            self.failures.push(InsertFailure {
                entity,
                stage,
                error,
            });
        }
    }
}

/// Builds partition subgraphs from one source model
pub struct PartitionBuilder<'g> {
    graph: &'g EntityGraph,
    context: ContextSet,
    closure: ClosurePolicy,
}

impl<'g> PartitionBuilder<'g> {
    /// Create a builder
    pub fn new(graph: &'g EntityGraph, context: ContextSet, closure: ClosurePolicy) -> Self {
        Self {
            graph,
            context,
            closure,
        }
    }

    /// Get the context set
    pub fn context(&self) -> &ContextSet {
        &self.context
    }

    /// Assemble the subgraph for one partition
    pub fn build(&self, partition: &Partition) -> BuildOutcome {
        let mut outcome = BuildOutcome::new(Subgraph::for_source(self.graph));

        let anchor = partition.anchor.filter(|_| self.context.include_anchor);
        for id in self.context.members.iter().copied().chain(anchor) {
            if let Err(e) = outcome.subgraph.add(self.graph, id) {
                outcome.record(id, FailureStage::Context, e);
            }
        }

        for &root in &partition.roots {
            if let Err(e) = outcome.subgraph.add(self.graph, root) {
                outcome.record(root, FailureStage::Root, e);
                continue;
            }
            outcome.added += 1;

            for dependency in closure(self.graph, root, &self.closure).into_iter().skip(1) {
                if let Err(e) = outcome.subgraph.add(self.graph, dependency) {
                    outcome.record(dependency, FailureStage::Dependency { root }, e);
                }
            }
        }

        if outcome.all_roots_failed() {
            warn!(
                "Partition '{}': all {} roots failed to insert",
                partition.name, outcome.failed_roots
            );
        } else if outcome.failed() > 0 {
            debug!(
                "Partition '{}': {} insertions failed",
                partition.name,
                outcome.failed()
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::parse_str;
    use crate::strategy::PartitionKind;
    use pretty_assertions::assert_eq;

    const MODEL: &str = "ISO-10303-21;
HEADER;
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCPROJECT('p',$,'P',$,$,$,$,$,$);
#2=IFCSITE('s',$,'Site',$,$,$,$,$,.ELEMENT.,$,$,$,$,$);
#3=IFCBUILDING('b',$,'B',$,$,$,$,$,.ELEMENT.,$,$,$);
#4=IFCBUILDINGSTOREY('l',$,'L1',$,$,$,$,$,.ELEMENT.,0.);
#10=IFCWALL('w',$,'W',$,$,$,$,$,$);
#11=IFCWALLTYPE('t',$,'T',$,$,$,$,$,$,.STANDARD.);
#12=IFCRELDEFINESBYTYPE('r',$,$,$,(#10),#11);
#13=IFCBEAM('b',$,'Beam',$,$,#99,$,$,$);
ENDSEC;
END-ISO-10303-21;
";

    fn partition(roots: &[u64]) -> Partition {
        Partition::new(
            "p",
            "p",
            PartitionKind::Chunk,
            roots.iter().map(|id| EntityId(*id)).collect(),
        )
    }

    #[test]
    fn test_context_resolution() {
        let graph = parse_str(MODEL).unwrap();
        let context = ContextSet::resolve(&graph, &ContextPolicy::default()).unwrap();
        assert_eq!(context.project(), EntityId(1));
        assert_eq!(
            context.members(),
            &[EntityId(1), EntityId(2), EntityId(3)]
        );

        let policy = ContextPolicy {
            extra_tags: vec!["IfcBuildingStorey".to_string()],
            include_anchor: false,
        };
        let context = ContextSet::resolve(&graph, &policy).unwrap();
        assert_eq!(context.members().len(), 4);
    }

    #[test]
    fn test_missing_project_is_fatal() {
        let graph = parse_str(
            "ISO-10303-21;HEADER;ENDSEC;DATA;#1=IFCWALL('w',$,$,$,$,$,$,$,$);ENDSEC;",
        )
        .unwrap();
        assert!(matches!(
            ContextSet::resolve(&graph, &ContextPolicy::default()),
            Err(SplitError::MissingProject)
        ));
    }

    #[test]
    fn test_build_inserts_context_roots_and_closure() {
        let graph = parse_str(MODEL).unwrap();
        let context = ContextSet::resolve(&graph, &ContextPolicy::default()).unwrap();
        let builder = PartitionBuilder::new(
            &graph,
            context,
            crate::strategy::type_and_property_closure(),
        );

        let outcome = builder.build(&partition(&[10]));
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.failed(), 0);
        let ids: Vec<u64> = outcome.subgraph.ids().map(|id| id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 10, 11, 12]);
    }

    #[test]
    fn test_build_counts_failures_and_continues() {
        let graph = parse_str(MODEL).unwrap();
        let context = ContextSet::resolve(&graph, &ContextPolicy::default()).unwrap();
        let builder = PartitionBuilder::new(&graph, context, ClosurePolicy::default());

        let outcome = builder.build(&partition(&[13, 404, 10]));
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.failed_roots, 2);
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome.subgraph.contains(EntityId(10)));
        assert!(!outcome.subgraph.contains(EntityId(13)));
        assert!(!outcome.all_roots_failed());
    }

    #[test]
    fn test_all_roots_failed_is_observable() {
        let graph = parse_str(MODEL).unwrap();
        let context = ContextSet::resolve(&graph, &ContextPolicy::default()).unwrap();
        let builder = PartitionBuilder::new(&graph, context, ClosurePolicy::default());

        let outcome = builder.build(&partition(&[13]));
        assert!(outcome.all_roots_failed());
        // Context still made it in
        assert_eq!(outcome.subgraph.len(), 3);
    }

    #[test]
    fn test_anchor_only_when_policy_asks() {
        let graph = parse_str(MODEL).unwrap();
        let with_anchor = ContextPolicy {
            extra_tags: Vec::new(),
            include_anchor: true,
        };
        let partition = partition(&[10]).with_anchor(EntityId(4));

        let context = ContextSet::resolve(&graph, &with_anchor).unwrap();
        let builder = PartitionBuilder::new(&graph, context, ClosurePolicy::default());
        assert!(builder.build(&partition).subgraph.contains(EntityId(4)));

        let context = ContextSet::resolve(&graph, &ContextPolicy::default()).unwrap();
        let builder = PartitionBuilder::new(&graph, context, ClosurePolicy::default());
        assert!(!builder.build(&partition).subgraph.contains(EntityId(4)));
    }

    #[test]
    fn test_roots_already_in_context_still_count() {
        let graph = parse_str(MODEL).unwrap();
        let context = ContextSet::resolve(&graph, &ContextPolicy::default()).unwrap();
        let builder = PartitionBuilder::new(&graph, context, ClosurePolicy::default());

        let outcome = builder.build(&partition(&[2, 3]));
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.subgraph.len(), 3);
    }
}
