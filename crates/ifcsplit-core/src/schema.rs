//! IFC Schema Vocabulary
//!
//! The slice of schema knowledge the partitioning engine needs:
//! - Normalized type tags (`IFCWALL`, compared case-insensitively)
//! - The product subtype hierarchy, so a by-type query for a supertype
//!   also matches its subtypes
//! - The relationship table that turns relationship entities into typed
//!   reference edges
//!
//! Both tables are plain data and can be extended without touching any
//! traversal code.

use crate::graph::ReferenceKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Index of the `Name` attribute on every `IfcRoot` subtype.
pub const NAME_SLOT: usize = 2;

/// Upper bound on the supertype chain walked by [`SchemaVocabulary::is_a`].
const MAX_HIERARCHY_DEPTH: usize = 64;

/// Well-known type tags, already normalized.
pub mod tags {
    pub const PROJECT: &str = "IFCPROJECT";
    pub const SITE: &str = "IFCSITE";
    pub const BUILDING: &str = "IFCBUILDING";
    pub const BUILDING_STOREY: &str = "IFCBUILDINGSTOREY";
    pub const SPACE: &str = "IFCSPACE";
    pub const PRODUCT: &str = "IFCPRODUCT";
    pub const ANNOTATION: &str = "IFCANNOTATION";
    pub const GRID: &str = "IFCGRID";
    pub const GRID_AXIS: &str = "IFCGRIDAXIS";
    pub const PROJECTION_ELEMENT: &str = "IFCPROJECTIONELEMENT";
    pub const REL_DEFINES_BY_TYPE: &str = "IFCRELDEFINESBYTYPE";
    pub const REL_DEFINES_BY_PROPERTIES: &str = "IFCRELDEFINESBYPROPERTIES";
    pub const REL_ASSOCIATES_MATERIAL: &str = "IFCRELASSOCIATESMATERIAL";
    pub const REL_CONTAINED_IN_SPATIAL_STRUCTURE: &str = "IFCRELCONTAINEDINSPATIALSTRUCTURE";
    pub const REL_AGGREGATES: &str = "IFCRELAGGREGATES";
}

// ============================================================================
// Type Tags
// ============================================================================

/// An entity type tag, normalized to upper case.
///
/// STEP files spell tags in upper case (`IFCWALL`) while schema documentation
/// and configuration usually use `IfcWall`; normalizing on construction makes
/// both spellings compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TypeTag(String);

impl TypeTag {
    /// Create a normalized tag
    pub fn new(tag: &str) -> Self {
        Self(tag.trim().to_ascii_uppercase())
    }

    /// Get the normalized tag text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for TypeTag {
    fn from(tag: String) -> Self {
        Self::new(&tag)
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        tag.0
    }
}

impl PartialEq<str> for TypeTag {
    fn eq(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for TypeTag {
    fn eq(&self, other: &&str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

// ============================================================================
// Product Hierarchy
// ============================================================================

/// `(subtype, supertype)` pairs for the `IfcProduct` subtree (IFC2x3/IFC4).
const PRODUCT_HIERARCHY: &[(&str, &str)] = &[
    // Product roots
    ("IfcElement", "IfcProduct"),
    ("IfcSpatialElement", "IfcProduct"),
    ("IfcAnnotation", "IfcProduct"),
    ("IfcGrid", "IfcProduct"),
    ("IfcPort", "IfcProduct"),
    ("IfcProxy", "IfcProduct"),
    ("IfcStructuralActivity", "IfcProduct"),
    ("IfcStructuralItem", "IfcProduct"),
    ("IfcPositioningElement", "IfcProduct"),
    ("IfcDistributionPort", "IfcPort"),
    // Spatial structure
    ("IfcSpatialStructureElement", "IfcSpatialElement"),
    ("IfcSpatialZone", "IfcSpatialElement"),
    ("IfcExternalSpatialStructureElement", "IfcSpatialElement"),
    ("IfcExternalSpatialElement", "IfcExternalSpatialStructureElement"),
    ("IfcSite", "IfcSpatialStructureElement"),
    ("IfcBuilding", "IfcSpatialStructureElement"),
    ("IfcBuildingStorey", "IfcSpatialStructureElement"),
    ("IfcSpace", "IfcSpatialStructureElement"),
    // Element families
    ("IfcBuildingElement", "IfcElement"),
    ("IfcBuiltElement", "IfcElement"),
    ("IfcCivilElement", "IfcElement"),
    ("IfcDistributionElement", "IfcElement"),
    ("IfcElementAssembly", "IfcElement"),
    ("IfcElementComponent", "IfcElement"),
    ("IfcFeatureElement", "IfcElement"),
    ("IfcFurnishingElement", "IfcElement"),
    ("IfcGeographicElement", "IfcElement"),
    ("IfcTransportElement", "IfcElement"),
    ("IfcVirtualElement", "IfcElement"),
    // Building elements
    ("IfcBeam", "IfcBuildingElement"),
    ("IfcBuildingElementProxy", "IfcBuildingElement"),
    ("IfcChimney", "IfcBuildingElement"),
    ("IfcColumn", "IfcBuildingElement"),
    ("IfcCovering", "IfcBuildingElement"),
    ("IfcCurtainWall", "IfcBuildingElement"),
    ("IfcDoor", "IfcBuildingElement"),
    ("IfcFooting", "IfcBuildingElement"),
    ("IfcMember", "IfcBuildingElement"),
    ("IfcPile", "IfcBuildingElement"),
    ("IfcPlate", "IfcBuildingElement"),
    ("IfcRailing", "IfcBuildingElement"),
    ("IfcRamp", "IfcBuildingElement"),
    ("IfcRampFlight", "IfcBuildingElement"),
    ("IfcRoof", "IfcBuildingElement"),
    ("IfcShadingDevice", "IfcBuildingElement"),
    ("IfcSlab", "IfcBuildingElement"),
    ("IfcStair", "IfcBuildingElement"),
    ("IfcStairFlight", "IfcBuildingElement"),
    ("IfcWall", "IfcBuildingElement"),
    ("IfcWindow", "IfcBuildingElement"),
    ("IfcBeamStandardCase", "IfcBeam"),
    ("IfcColumnStandardCase", "IfcColumn"),
    ("IfcDoorStandardCase", "IfcDoor"),
    ("IfcMemberStandardCase", "IfcMember"),
    ("IfcPlateStandardCase", "IfcPlate"),
    ("IfcSlabStandardCase", "IfcSlab"),
    ("IfcSlabElementedCase", "IfcSlab"),
    ("IfcWallStandardCase", "IfcWall"),
    ("IfcWallElementedCase", "IfcWall"),
    ("IfcWindowStandardCase", "IfcWindow"),
    // Distribution
    ("IfcDistributionFlowElement", "IfcDistributionElement"),
    ("IfcDistributionControlElement", "IfcDistributionElement"),
    ("IfcDistributionChamberElement", "IfcDistributionFlowElement"),
    ("IfcEnergyConversionDevice", "IfcDistributionFlowElement"),
    ("IfcFlowController", "IfcDistributionFlowElement"),
    ("IfcFlowFitting", "IfcDistributionFlowElement"),
    ("IfcFlowMovingDevice", "IfcDistributionFlowElement"),
    ("IfcFlowSegment", "IfcDistributionFlowElement"),
    ("IfcFlowStorageDevice", "IfcDistributionFlowElement"),
    ("IfcFlowTerminal", "IfcDistributionFlowElement"),
    ("IfcFlowTreatmentDevice", "IfcDistributionFlowElement"),
    ("IfcPipeSegment", "IfcFlowSegment"),
    ("IfcDuctSegment", "IfcFlowSegment"),
    ("IfcCableSegment", "IfcFlowSegment"),
    ("IfcCableCarrierSegment", "IfcFlowSegment"),
    ("IfcPipeFitting", "IfcFlowFitting"),
    ("IfcDuctFitting", "IfcFlowFitting"),
    ("IfcCableFitting", "IfcFlowFitting"),
    ("IfcCableCarrierFitting", "IfcFlowFitting"),
    ("IfcJunctionBox", "IfcFlowFitting"),
    ("IfcAirTerminal", "IfcFlowTerminal"),
    ("IfcAudioVisualAppliance", "IfcFlowTerminal"),
    ("IfcCommunicationsAppliance", "IfcFlowTerminal"),
    ("IfcElectricAppliance", "IfcFlowTerminal"),
    ("IfcFireSuppressionTerminal", "IfcFlowTerminal"),
    ("IfcLamp", "IfcFlowTerminal"),
    ("IfcLightFixture", "IfcFlowTerminal"),
    ("IfcMedicalDevice", "IfcFlowTerminal"),
    ("IfcOutlet", "IfcFlowTerminal"),
    ("IfcSanitaryTerminal", "IfcFlowTerminal"),
    ("IfcSpaceHeater", "IfcFlowTerminal"),
    ("IfcStackTerminal", "IfcFlowTerminal"),
    ("IfcWasteTerminal", "IfcFlowTerminal"),
    ("IfcAirTerminalBox", "IfcFlowController"),
    ("IfcDamper", "IfcFlowController"),
    ("IfcElectricDistributionBoard", "IfcFlowController"),
    ("IfcElectricTimeControl", "IfcFlowController"),
    ("IfcFlowMeter", "IfcFlowController"),
    ("IfcProtectiveDevice", "IfcFlowController"),
    ("IfcSwitchingDevice", "IfcFlowController"),
    ("IfcValve", "IfcFlowController"),
    ("IfcCompressor", "IfcFlowMovingDevice"),
    ("IfcFan", "IfcFlowMovingDevice"),
    ("IfcPump", "IfcFlowMovingDevice"),
    ("IfcElectricFlowStorageDevice", "IfcFlowStorageDevice"),
    ("IfcTank", "IfcFlowStorageDevice"),
    ("IfcDuctSilencer", "IfcFlowTreatmentDevice"),
    ("IfcFilter", "IfcFlowTreatmentDevice"),
    ("IfcInterceptor", "IfcFlowTreatmentDevice"),
    ("IfcAirToAirHeatRecovery", "IfcEnergyConversionDevice"),
    ("IfcBoiler", "IfcEnergyConversionDevice"),
    ("IfcBurner", "IfcEnergyConversionDevice"),
    ("IfcChiller", "IfcEnergyConversionDevice"),
    ("IfcCoil", "IfcEnergyConversionDevice"),
    ("IfcCondenser", "IfcEnergyConversionDevice"),
    ("IfcCooledBeam", "IfcEnergyConversionDevice"),
    ("IfcCoolingTower", "IfcEnergyConversionDevice"),
    ("IfcElectricGenerator", "IfcEnergyConversionDevice"),
    ("IfcElectricMotor", "IfcEnergyConversionDevice"),
    ("IfcEngine", "IfcEnergyConversionDevice"),
    ("IfcEvaporativeCooler", "IfcEnergyConversionDevice"),
    ("IfcEvaporator", "IfcEnergyConversionDevice"),
    ("IfcHeatExchanger", "IfcEnergyConversionDevice"),
    ("IfcHumidifier", "IfcEnergyConversionDevice"),
    ("IfcMotorConnection", "IfcEnergyConversionDevice"),
    ("IfcSolarDevice", "IfcEnergyConversionDevice"),
    ("IfcTransformer", "IfcEnergyConversionDevice"),
    ("IfcTubeBundle", "IfcEnergyConversionDevice"),
    ("IfcUnitaryEquipment", "IfcEnergyConversionDevice"),
    ("IfcActuator", "IfcDistributionControlElement"),
    ("IfcAlarm", "IfcDistributionControlElement"),
    ("IfcController", "IfcDistributionControlElement"),
    ("IfcFlowInstrument", "IfcDistributionControlElement"),
    ("IfcProtectiveDeviceTrippingUnit", "IfcDistributionControlElement"),
    ("IfcSensor", "IfcDistributionControlElement"),
    ("IfcUnitaryControlElement", "IfcDistributionControlElement"),
    // Components
    ("IfcBuildingElementPart", "IfcElementComponent"),
    ("IfcDiscreteAccessory", "IfcElementComponent"),
    ("IfcFastener", "IfcElementComponent"),
    ("IfcMechanicalFastener", "IfcElementComponent"),
    ("IfcReinforcingElement", "IfcElementComponent"),
    ("IfcVibrationIsolator", "IfcElementComponent"),
    ("IfcReinforcingBar", "IfcReinforcingElement"),
    ("IfcReinforcingMesh", "IfcReinforcingElement"),
    ("IfcTendon", "IfcReinforcingElement"),
    ("IfcTendonAnchor", "IfcReinforcingElement"),
    // Features
    ("IfcFeatureElementAddition", "IfcFeatureElement"),
    ("IfcFeatureElementSubtraction", "IfcFeatureElement"),
    ("IfcSurfaceFeature", "IfcFeatureElement"),
    ("IfcProjectionElement", "IfcFeatureElementAddition"),
    ("IfcOpeningElement", "IfcFeatureElementSubtraction"),
    ("IfcVoidingFeature", "IfcFeatureElementSubtraction"),
    ("IfcOpeningStandardCase", "IfcOpeningElement"),
    // Furnishing
    ("IfcFurniture", "IfcFurnishingElement"),
    ("IfcSystemFurnitureElement", "IfcFurnishingElement"),
];

/// Subtype relation over type tags.
#[derive(Debug, Clone, Default)]
pub struct SchemaVocabulary {
    /// Map from subtype to its direct supertype
    parents: HashMap<TypeTag, TypeTag>,
}

impl SchemaVocabulary {
    /// Create a vocabulary with no subtype knowledge (exact tag matching only)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create the built-in IFC product vocabulary
    pub fn ifc() -> Self {
        PRODUCT_HIERARCHY
            .iter()
            .fold(Self::empty(), |vocab, (child, parent)| {
                vocab.with_subtype(child, parent)
            })
    }

    /// Register `child` as a direct subtype of `parent`
    pub fn with_subtype(mut self, child: &str, parent: &str) -> Self {
        self.parents.insert(TypeTag::new(child), TypeTag::new(parent));
        self
    }

    /// Get the direct supertype of a tag, if known
    pub fn parent(&self, tag: &TypeTag) -> Option<&TypeTag> {
        self.parents.get(tag)
    }

    /// Check whether `tag` is `ancestor` or one of its subtypes
    pub fn is_a(&self, tag: &TypeTag, ancestor: &TypeTag) -> bool {
        let mut current = tag;
        for _ in 0..MAX_HIERARCHY_DEPTH {
            if current == ancestor {
                return true;
            }
            match self.parents.get(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }
}

// ============================================================================
// Relationship Table
// ============================================================================

/// How a relationship entity's slots map onto typed edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRule {
    /// Edge kind produced by this relationship
    pub kind: ReferenceKind,
    /// Slot holding the relating side (definition or structure)
    pub relating_slot: usize,
    /// Slot holding the related side (instances or members)
    pub related_slot: usize,
}

impl RelationRule {
    /// Create a rule
    pub fn new(kind: ReferenceKind, relating_slot: usize, related_slot: usize) -> Self {
        Self {
            kind,
            relating_slot,
            related_slot,
        }
    }

    /// Check whether a slot is one of the typed slots of this rule
    pub fn is_typed_slot(&self, slot: usize) -> bool {
        slot == self.relating_slot || slot == self.related_slot
    }
}

/// Table of relationship entity tags that produce typed edges.
#[derive(Debug, Clone, Default)]
pub struct RelationSchema {
    rules: HashMap<TypeTag, RelationRule>,
}

impl RelationSchema {
    /// Create an empty table (every reference becomes an `Attribute` edge)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create the built-in IFC relationship table
    pub fn ifc() -> Self {
        Self::empty()
            .with_rule(
                tags::REL_DEFINES_BY_TYPE,
                RelationRule::new(ReferenceKind::TypeAssignment, 5, 4),
            )
            .with_rule(
                tags::REL_DEFINES_BY_PROPERTIES,
                RelationRule::new(ReferenceKind::PropertyAssociation, 5, 4),
            )
            .with_rule(
                tags::REL_ASSOCIATES_MATERIAL,
                RelationRule::new(ReferenceKind::MaterialAssociation, 5, 4),
            )
            .with_rule(
                tags::REL_CONTAINED_IN_SPATIAL_STRUCTURE,
                RelationRule::new(ReferenceKind::SpatialContainment, 5, 4),
            )
            .with_rule(
                tags::REL_AGGREGATES,
                RelationRule::new(ReferenceKind::SpatialDecomposition, 4, 5),
            )
    }

    /// Add or replace the rule for a relationship tag
    pub fn with_rule(mut self, tag: &str, rule: RelationRule) -> Self {
        self.rules.insert(TypeTag::new(tag), rule);
        self
    }

    /// Get the rule for a tag, if it is a relationship
    pub fn rule_for(&self, tag: &TypeTag) -> Option<&RelationRule> {
        self.rules.get(tag)
    }

    /// Iterate over relationship tags producing the given edge kind
    pub fn tags_of_kind(
        &self,
        kind: ReferenceKind,
    ) -> impl Iterator<Item = (&TypeTag, &RelationRule)> {
        self.rules.iter().filter(move |(_, rule)| rule.kind == kind)
    }

    /// Check whether any relationship produces the given edge kind
    pub fn has_kind(&self, kind: ReferenceKind) -> bool {
        self.rules.values().any(|rule| rule.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tag_normalization() {
        assert_eq!(TypeTag::new("IfcWall"), TypeTag::new("IFCWALL"));
        assert_eq!(TypeTag::new(" ifcwall "), TypeTag::new("IFCWALL"));
        assert_eq!(TypeTag::new("IfcWall").as_str(), "IFCWALL");
        assert!(TypeTag::new("IFCWALL") == "IfcWall");
    }

    #[test]
    fn test_type_tag_serde() {
        let tag: TypeTag = serde_json::from_str("\"IfcBeam\"").unwrap();
        assert_eq!(tag.as_str(), "IFCBEAM");
        assert_eq!(serde_json::to_string(&tag).unwrap(), "\"IFCBEAM\"");
    }

    #[test]
    fn test_is_a_walks_supertypes() {
        let vocab = SchemaVocabulary::ifc();
        let product = TypeTag::new(tags::PRODUCT);

        assert!(vocab.is_a(&TypeTag::new("IfcWallStandardCase"), &product));
        assert!(vocab.is_a(
            &TypeTag::new("IfcSanitaryTerminal"),
            &TypeTag::new("IfcDistributionElement")
        ));
        assert!(vocab.is_a(&TypeTag::new("IfcWall"), &TypeTag::new("IfcWall")));
        assert!(!vocab.is_a(&TypeTag::new("IfcWall"), &TypeTag::new("IfcBeam")));
        assert!(!vocab.is_a(&TypeTag::new(tags::PROJECT), &product));
    }

    #[test]
    fn test_empty_vocabulary_is_exact() {
        let vocab = SchemaVocabulary::empty();
        assert!(vocab.is_a(&TypeTag::new("IfcWall"), &TypeTag::new("IfcWall")));
        assert!(!vocab.is_a(&TypeTag::new("IfcWall"), &TypeTag::new("IfcProduct")));
    }

    #[test]
    fn test_hierarchy_cycle_terminates() {
        let vocab = SchemaVocabulary::empty()
            .with_subtype("A", "B")
            .with_subtype("B", "A");
        assert!(!vocab.is_a(&TypeTag::new("A"), &TypeTag::new("C")));
    }

    #[test]
    fn test_relation_schema_lookup() {
        let relations = RelationSchema::ifc();
        let rule = relations
            .rule_for(&TypeTag::new("IfcRelAggregates"))
            .unwrap();
        assert_eq!(rule.kind, ReferenceKind::SpatialDecomposition);
        assert_eq!(rule.relating_slot, 4);
        assert!(rule.is_typed_slot(5));
        assert!(!rule.is_typed_slot(1));

        assert!(relations.has_kind(ReferenceKind::SpatialContainment));
        assert!(!RelationSchema::empty().has_kind(ReferenceKind::SpatialContainment));
        assert_eq!(
            relations
                .tags_of_kind(ReferenceKind::TypeAssignment)
                .count(),
            1
        );
    }
}
