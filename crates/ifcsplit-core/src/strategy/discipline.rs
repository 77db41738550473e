//! Discipline partitions: one partition per entry of a discipline table.
//!
//! A type tag may appear under several disciplines; matching entities are
//! then assigned to each of them.

use super::{
    claim_unique_name, sanitize_name, type_and_property_closure, ContextPolicy, Partition,
    PartitionKind, PartitionStrategy,
};
use crate::closure::ClosurePolicy;
use crate::graph::EntityGraph;
use crate::schema::{tags, TypeTag};
use crate::splitter::SplitError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// A named list of type tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discipline {
    pub name: String,
    pub types: Vec<String>,
}

impl Discipline {
    /// Create a discipline
    pub fn new(name: &str, types: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Check whether a tag is listed (case-insensitive, no subtype matching)
    pub fn lists(&self, tag: &TypeTag) -> bool {
        self.types.iter().any(|t| tag == t.as_str())
    }
}

/// Ordered discipline → type tag table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisciplineTable {
    disciplines: Vec<Discipline>,
}

impl Default for DisciplineTable {
    fn default() -> Self {
        Self::new(vec![
            Discipline::new(
                "Architecture",
                &[
                    "IfcWall",
                    "IfcWindow",
                    "IfcDoor",
                    "IfcSlab",
                    "IfcRoof",
                    "IfcStair",
                    "IfcRailing",
                    "IfcCurtainWall",
                    "IfcSpace",
                    "IfcCovering",
                    "IfcFurnishingElement",
                ],
            ),
            Discipline::new(
                "Structure",
                &[
                    "IfcBeam",
                    "IfcColumn",
                    "IfcFooting",
                    "IfcPile",
                    "IfcReinforcingBar",
                    "IfcReinforcingMesh",
                    "IfcMember",
                    "IfcPlate",
                    "IfcTendon",
                    "IfcTendonAnchor",
                ],
            ),
            Discipline::new(
                "MEP",
                &[
                    "IfcPipeSegment",
                    "IfcDuctSegment",
                    "IfcFlowTerminal",
                    "IfcFlowFitting",
                    "IfcFlowController",
                    "IfcEnergyConversionDevice",
                    "IfcDistributionElement",
                    "IfcElectricAppliance",
                    "IfcFlowMovingDevice",
                    "IfcFlowStorageDevice",
                    "IfcFlowTreatmentDevice",
                ],
            ),
            Discipline::new(
                "Equipment",
                &[
                    "IfcFurnishingElement",
                    "IfcSystemFurnitureElement",
                    "IfcElectricAppliance",
                    "IfcFireSuppressionTerminal",
                    "IfcSanitaryTerminal",
                    "IfcMedicalDevice",
                ],
            ),
        ])
    }
}

impl DisciplineTable {
    /// Create a table from disciplines in output order
    pub fn new(disciplines: Vec<Discipline>) -> Self {
        Self { disciplines }
    }

    /// Iterate over disciplines in order
    pub fn iter(&self) -> impl Iterator<Item = &Discipline> {
        self.disciplines.iter()
    }

    /// Number of disciplines
    pub fn len(&self) -> usize {
        self.disciplines.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.disciplines.is_empty()
    }

    /// Names of the disciplines listing a tag
    pub fn disciplines_for(&self, tag: &str) -> Vec<&str> {
        let tag = TypeTag::new(tag);
        self.disciplines
            .iter()
            .filter(|d| d.lists(&tag))
            .map(|d| d.name.as_str())
            .collect()
    }
}

/// One partition per discipline
#[derive(Debug, Clone)]
pub struct DisciplineStrategy {
    table: DisciplineTable,
    closure: ClosurePolicy,
}

impl Default for DisciplineStrategy {
    fn default() -> Self {
        Self::new(DisciplineTable::default(), type_and_property_closure())
    }
}

impl DisciplineStrategy {
    /// Create a discipline strategy
    pub fn new(table: DisciplineTable, closure: ClosurePolicy) -> Self {
        Self { table, closure }
    }

    /// Get the discipline table
    pub fn table(&self) -> &DisciplineTable {
        &self.table
    }
}

impl PartitionStrategy for DisciplineStrategy {
    fn kind(&self) -> PartitionKind {
        PartitionKind::Discipline
    }

    fn closure_policy(&self) -> &ClosurePolicy {
        &self.closure
    }

    fn context_policy(&self) -> ContextPolicy {
        ContextPolicy {
            extra_tags: vec![tags::BUILDING_STOREY.to_string(), tags::SPACE.to_string()],
            include_anchor: false,
        }
    }

    fn assign(&self, graph: &EntityGraph) -> Result<Vec<Partition>, SplitError> {
        let mut partitions = Vec::with_capacity(self.table.len());
        let mut used_names = HashSet::new();

        for discipline in self.table.iter() {
            let mut seen = HashSet::new();
            let mut roots = Vec::new();
            for tag in &discipline.types {
                for entity in graph.entities_of_kind(tag) {
                    if seen.insert(entity.id) {
                        roots.push(entity.id);
                    }
                }
            }
            debug!("Discipline '{}': {} elements", discipline.name, roots.len());

            let mut name = sanitize_name(&discipline.name);
            if name.is_empty() {
                name = format!("Discipline_{}", partitions.len() + 1);
            }
            let name = claim_unique_name(&mut used_names, name, partitions.len() + 1);
            partitions.push(Partition::new(
                name,
                discipline.name.clone(),
                PartitionKind::Discipline,
                roots,
            ));
        }

        Ok(partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EntityId;
    use crate::step::parse_str;
    use pretty_assertions::assert_eq;

    const MODEL: &str = "ISO-10303-21;
HEADER;
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCPROJECT('p',$,'P',$,$,$,$,$,$);
#10=IFCWALL('w',$,'W',$,$,$,$,$,$);
#11=IFCWALLSTANDARDCASE('w2',$,'W2',$,$,$,$,$,$);
#12=IFCBEAM('b',$,'B',$,$,$,$,$,$);
#13=IFCPIPESEGMENT('ps',$,'P',$,$,$,$,$,$);
#14=IFCFURNITURE('f',$,'F',$,$,$,$,$,$);
#15=IFCELECTRICAPPLIANCE('e',$,'E',$,$,$,$,$,$);
ENDSEC;
END-ISO-10303-21;
";

    fn roots_of<'a>(partitions: &'a [Partition], name: &str) -> &'a [EntityId] {
        &partitions
            .iter()
            .find(|p| p.name == name)
            .unwrap()
            .roots
    }

    #[test]
    fn test_default_table_order() {
        let names: Vec<_> = DisciplineTable::default()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(names, vec!["Architecture", "Structure", "MEP", "Equipment"]);
    }

    #[test]
    fn test_assign_matches_subtypes() {
        let graph = parse_str(MODEL).unwrap();
        let partitions = DisciplineStrategy::default().assign(&graph).unwrap();

        assert_eq!(partitions.len(), 4);
        assert_eq!(
            roots_of(&partitions, "Architecture"),
            &[EntityId(10), EntityId(11), EntityId(14)]
        );
        assert_eq!(roots_of(&partitions, "Structure"), &[EntityId(12)]);
    }

    #[test]
    fn test_overlap_is_preserved() {
        let graph = parse_str(MODEL).unwrap();
        let partitions = DisciplineStrategy::default().assign(&graph).unwrap();

        // IfcElectricAppliance is listed under both MEP and Equipment
        assert!(roots_of(&partitions, "MEP").contains(&EntityId(15)));
        assert!(roots_of(&partitions, "Equipment").contains(&EntityId(15)));
        // Within MEP the supertype entry does not duplicate the pipe
        assert_eq!(roots_of(&partitions, "MEP"), &[EntityId(13), EntityId(15)]);
    }

    #[test]
    fn test_disciplines_for() {
        let table = DisciplineTable::default();
        assert_eq!(
            table.disciplines_for("IFCFURNISHINGELEMENT"),
            vec!["Architecture", "Equipment"]
        );
        assert!(table.disciplines_for("IfcProject").is_empty());
    }

    #[test]
    fn test_empty_discipline_yields_empty_partition() {
        let graph = parse_str(MODEL).unwrap();
        let table = DisciplineTable::new(vec![Discipline::new("Site Works", &["IfcPavement"])]);
        let partitions = DisciplineStrategy::new(table, type_and_property_closure())
            .assign(&graph)
            .unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].name, "Site_Works");
        assert!(partitions[0].is_empty());
    }

    #[test]
    fn test_colliding_sanitized_names_get_suffixes() {
        let graph = parse_str(MODEL).unwrap();
        let table = DisciplineTable::new(vec![
            Discipline::new("Site Works", &["IfcWall"]),
            Discipline::new("Site_Works", &["IfcBeam"]),
        ]);
        let partitions = DisciplineStrategy::new(table, type_and_property_closure())
            .assign(&graph)
            .unwrap();

        let names: Vec<_> = partitions.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Site_Works", "Site_Works_2"]);
        assert_eq!(partitions[1].label, "Site_Works");
        assert_eq!(partitions[1].roots, vec![EntityId(12)]);
    }
}
