//! Output Subgraphs
//!
//! A [`Subgraph`] is the in-memory form of one partition file: copies of
//! source entities keyed by id. Adding an entity always brings its plain
//! attribute dependencies along (placement, representation, owner history),
//! so every copied entity can be written without dangling structural
//! references. Relationship member slots are not followed; references to
//! entities that did not make it into the subgraph are pruned on write.

use crate::graph::{Entity, EntityGraph, EntityId};
use crate::step::{write_document, StepHeader};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Why an entity could not be added to a subgraph
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InsertError {
    #[error("entity {0} is not part of the source model")]
    NotInSource(EntityId),

    #[error("entity {entity} references {missing}, which is not part of the source model")]
    UnresolvedReference { entity: EntityId, missing: EntityId },
}

/// Result of a successful [`Subgraph::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The entity was copied, along with `inserted - 1` dependencies
    Added { inserted: usize },
    /// The entity was already present; nothing changed
    AlreadyPresent,
}

/// An output graph assembled from a source model.
#[derive(Debug, Clone)]
pub struct Subgraph {
    header: StepHeader,
    entities: BTreeMap<EntityId, Entity>,
}

impl Subgraph {
    /// Create an empty subgraph
    pub fn new(header: StepHeader) -> Self {
        Self {
            header,
            entities: BTreeMap::new(),
        }
    }

    /// Create an empty subgraph with the source model's header and schema
    pub fn for_source(source: &EntityGraph) -> Self {
        Self::new(source.header().clone())
    }

    /// Copy an entity and its attribute dependencies from `source`.
    ///
    /// Atomic: on error nothing is inserted. Re-adding a present entity is a
    /// no-op.
    pub fn add(&mut self, source: &EntityGraph, id: EntityId) -> Result<AddOutcome, InsertError> {
        if self.entities.contains_key(&id) {
            return Ok(AddOutcome::AlreadyPresent);
        }
        if !source.contains(id) {
            return Err(InsertError::NotInSource(id));
        }

        let dependencies = source.structural_dependencies(id);
        for dependency in &dependencies {
            if let Some(&missing) = source.unresolved_references(*dependency).first() {
                return Err(InsertError::UnresolvedReference {
                    entity: *dependency,
                    missing,
                });
            }
        }

        let mut inserted = 0;
        for dependency in dependencies {
            if let Entry::Vacant(slot) = self.entities.entry(dependency) {
                if let Some(entity) = source.get(dependency) {
                    slot.insert(entity.clone());
                    inserted += 1;
                }
            }
        }
        Ok(AddOutcome::Added { inserted })
    }

    /// Check if the subgraph holds an entity
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Get a copied entity
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the subgraph is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Get the header written with this subgraph
    pub fn header(&self) -> &StepHeader {
        &self.header
    }

    /// Serialize to any writer; returns the number of pruned references
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<usize> {
        write_document(out, &self.header, self.entities.values(), |id| {
            self.entities.contains_key(&id)
        })
    }

    /// Write the subgraph as a STEP file; returns the number of pruned references
    pub fn write(&self, path: &Path) -> io::Result<usize> {
        let mut out = BufWriter::new(File::create(path)?);
        let pruned = self.write_to(&mut out)?;
        out.flush()?;
        debug!(
            "Wrote {} entities to {} ({} references pruned)",
            self.len(),
            path.display(),
            pruned
        );
        Ok(pruned)
    }
}

/// Size of a written file in bytes
pub fn size_on_disk(path: &Path) -> io::Result<u64> {
    Ok(fs::metadata(path)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Value;
    use crate::step::parse_str;
    use tempfile::TempDir;

    const MODEL: &str = "ISO-10303-21;
HEADER;
FILE_SCHEMA(('IFC2X3'));
ENDSEC;
DATA;
#1=IFCCARTESIANPOINT((0.,0.,0.));
#2=IFCAXIS2PLACEMENT3D(#1,$,$);
#3=IFCLOCALPLACEMENT($,#2);
#10=IFCBUILDINGSTOREY('s',$,'L1',$,$,#3,$,$,.ELEMENT.,0.);
#20=IFCWALL('w',$,'W',$,$,#3,$,$);
#21=IFCWALL('w2',$,'W2',$,$,#99,$,$);
#30=IFCRELCONTAINEDINSPATIALSTRUCTURE('c',$,$,$,(#20,#21),#10);
ENDSEC;
END-ISO-10303-21;
";

    #[test]
    fn test_add_copies_attribute_closure() {
        let source = parse_str(MODEL).unwrap();
        let mut subgraph = Subgraph::for_source(&source);

        let outcome = subgraph.add(&source, EntityId(20)).unwrap();
        assert_eq!(outcome, AddOutcome::Added { inserted: 4 });
        for id in [1, 2, 3, 20] {
            assert!(subgraph.contains(EntityId(id)));
        }
        assert!(!subgraph.contains(EntityId(10)));
        assert!(!subgraph.contains(EntityId(30)));
    }

    #[test]
    fn test_add_is_idempotent() {
        let source = parse_str(MODEL).unwrap();
        let mut subgraph = Subgraph::for_source(&source);

        subgraph.add(&source, EntityId(20)).unwrap();
        let count = subgraph.len();
        assert_eq!(
            subgraph.add(&source, EntityId(20)).unwrap(),
            AddOutcome::AlreadyPresent
        );
        assert_eq!(subgraph.len(), count);
    }

    #[test]
    fn test_add_failures_are_atomic() {
        let source = parse_str(MODEL).unwrap();
        let mut subgraph = Subgraph::for_source(&source);

        assert_eq!(
            subgraph.add(&source, EntityId(500)),
            Err(InsertError::NotInSource(EntityId(500)))
        );
        assert_eq!(
            subgraph.add(&source, EntityId(21)),
            Err(InsertError::UnresolvedReference {
                entity: EntityId(21),
                missing: EntityId(99),
            })
        );
        assert!(subgraph.is_empty());
    }

    #[test]
    fn test_write_prunes_missing_members() {
        let source = parse_str(MODEL).unwrap();
        let mut subgraph = Subgraph::for_source(&source);
        for id in [10, 20, 30] {
            subgraph.add(&source, EntityId(id)).unwrap();
        }

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("part.ifc");
        let pruned = subgraph.write(&path).unwrap();
        assert_eq!(pruned, 1);
        assert!(size_on_disk(&path).unwrap() > 0);

        let written = crate::step::read_model(&path).unwrap();
        assert_eq!(written.schema(), "IFC2X3");
        assert_eq!(written.len(), subgraph.len());
        let rel = written.get(EntityId(30)).unwrap();
        assert_eq!(rel.attributes[4], Value::List(vec![Value::Ref(EntityId(20))]));
        assert_eq!(written.containment_of(EntityId(10)), vec![EntityId(20)]);
    }
}
