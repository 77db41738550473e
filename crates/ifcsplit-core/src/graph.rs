//! Entity Graph
//!
//! In-memory model of a loaded building model: every STEP instance becomes an
//! [`Entity`] node of a `petgraph::StableGraph`, and every reference between
//! instances becomes a typed edge.
//!
//! Plain attribute references (placement, representation, owner history)
//! become [`ReferenceKind::Attribute`] edges. Relationship entities listed in
//! the [`RelationSchema`] produce typed edges instead, oriented so that
//! following outgoing edges walks from an element to what defines it, or from
//! a spatial structure to what it contains:
//!
//! ```text
//! wall ──TypeAssignment──▶ IfcRelDefinesByType ──TypeAssignment──▶ IfcWallType
//! storey ──SpatialContainment──▶ IfcRelContained… ──SpatialContainment──▶ wall
//! ```

use crate::schema::{RelationSchema, SchemaVocabulary, TypeTag, NAME_SLOT};
use crate::step::{decode_string, StepHeader};
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while assembling a graph
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate entity id {0}")]
    DuplicateEntity(EntityId),
}

/// Errors raised by [`EntityGraph::remove`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RemoveError {
    #[error("entity {0} not found")]
    NotFound(EntityId),

    #[error("entity {id} is still referenced by {by}")]
    StillReferenced { id: EntityId, by: EntityId },
}

// ============================================================================
// Identifiers and Values
// ============================================================================

/// Instance id of an entity (`#42` in the STEP file).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One attribute value of an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unset attribute (`$`)
    Null,
    /// Attribute derived by a supertype (`*`)
    Derived,
    Integer(i64),
    Real(f64),
    /// String with STEP escapes kept encoded (`''` already collapsed)
    String(String),
    /// Enumeration literal without the surrounding dots
    Enum(String),
    /// Binary literal without the surrounding quotes
    Binary(String),
    Ref(EntityId),
    List(Vec<Value>),
    /// Typed parameter such as `IFCLABEL('x')`
    Typed { tag: TypeTag, value: Box<Value> },
}

impl Value {
    /// Get the referenced id when this value is a single reference
    pub fn as_entity_ref(&self) -> Option<EntityId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Get the raw text of a string value, looking through typed wrappers
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Typed { value, .. } => value.as_text(),
            _ => None,
        }
    }

    /// Collect every entity reference in this value, in written order
    pub fn references(&self) -> Vec<EntityId> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<EntityId>) {
        match self {
            Value::Ref(id) => out.push(*id),
            Value::List(items) => items.iter().for_each(|item| item.collect_references(out)),
            Value::Typed { value, .. } => value.collect_references(out),
            _ => {}
        }
    }

    /// Remove references rejected by `keep`.
    ///
    /// Rejected list members are dropped; a rejected scalar reference becomes
    /// [`Value::Null`]. Returns the number of references removed.
    pub fn prune_references<F>(&mut self, keep: &F) -> usize
    where
        F: Fn(EntityId) -> bool,
    {
        match self {
            Value::Ref(id) if !keep(*id) => {
                *self = Value::Null;
                1
            }
            Value::List(items) => {
                let before = items.len();
                items.retain(|item| !matches!(item, Value::Ref(id) if !keep(*id)));
                let mut pruned = before - items.len();
                for item in items.iter_mut() {
                    pruned += item.prune_references(keep);
                }
                pruned
            }
            Value::Typed { value, .. } => {
                let pruned = value.prune_references(keep);
                let emptied = pruned > 0 && matches!(**value, Value::Null);
                if emptied {
                    *self = Value::Null;
                }
                pruned
            }
            _ => 0,
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A typed record of the building model.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub type_tag: TypeTag,
    pub attributes: Vec<Value>,
}

impl Entity {
    /// Create an entity
    pub fn new(id: u64, type_tag: &str, attributes: Vec<Value>) -> Self {
        Self {
            id: EntityId(id),
            type_tag: TypeTag::new(type_tag),
            attributes,
        }
    }

    /// Get the attribute at a positional slot
    pub fn attribute(&self, slot: usize) -> Option<&Value> {
        self.attributes.get(slot)
    }

    /// Decoded `Name` attribute; `None` when unset or blank
    pub fn name(&self) -> Option<String> {
        let raw = self.attribute(NAME_SLOT)?.as_text()?;
        let decoded = decode_string(raw);
        let trimmed = decoded.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Every entity reference held by this entity
    pub fn references(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.attributes.iter().flat_map(Value::references)
    }
}

// ============================================================================
// Edges
// ============================================================================

/// Kind of a reference edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Plain attribute reference (structural dependency)
    Attribute,
    /// Instance to its defining type object
    #[serde(alias = "type")]
    TypeAssignment,
    /// Instance to its property set definitions
    #[serde(alias = "property")]
    PropertyAssociation,
    /// Instance to its material definition
    #[serde(alias = "material")]
    MaterialAssociation,
    /// Spatial structure to the elements located in it
    #[serde(alias = "containment")]
    SpatialContainment,
    /// Parent spatial structure to its child structures
    #[serde(alias = "decomposition")]
    SpatialDecomposition,
}

impl ReferenceKind {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Attribute => "attribute",
            ReferenceKind::TypeAssignment => "type_assignment",
            ReferenceKind::PropertyAssociation => "property_association",
            ReferenceKind::MaterialAssociation => "material_association",
            ReferenceKind::SpatialContainment => "spatial_containment",
            ReferenceKind::SpatialDecomposition => "spatial_decomposition",
        }
    }

    /// Spatial kinds run from structure to member
    pub fn is_spatial(&self) -> bool {
        matches!(
            self,
            ReferenceKind::SpatialContainment | ReferenceKind::SpatialDecomposition
        )
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReferenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "attribute" => Ok(ReferenceKind::Attribute),
            "type_assignment" | "type" => Ok(ReferenceKind::TypeAssignment),
            "property_association" | "property" => Ok(ReferenceKind::PropertyAssociation),
            "material_association" | "material" => Ok(ReferenceKind::MaterialAssociation),
            "spatial_containment" | "containment" => Ok(ReferenceKind::SpatialContainment),
            "spatial_decomposition" | "decomposition" => {
                Ok(ReferenceKind::SpatialDecomposition)
            }
            _ => Err(format!("unknown reference kind: {}", s)),
        }
    }
}

/// Data stored on each edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeData {
    pub kind: ReferenceKind,
    /// Attribute slot of the entity holding the reference
    pub slot: usize,
}

// ============================================================================
// Entity Graph
// ============================================================================

/// A loaded building model with typed reference edges.
#[derive(Debug, Clone)]
pub struct EntityGraph {
    /// The underlying petgraph instance
    graph: StableGraph<Entity, EdgeData, petgraph::Directed>,

    /// Map from entity id to NodeIndex for O(1) lookup
    index: HashMap<EntityId, NodeIndex>,

    /// Load order; may still list removed ids
    order: Vec<EntityId>,

    /// Exact type tag index in load order; may still list removed ids
    by_type: HashMap<TypeTag, Vec<EntityId>>,

    /// Attribute references whose target is absent from the model
    unresolved: HashMap<EntityId, Vec<EntityId>>,

    header: StepHeader,
    vocabulary: SchemaVocabulary,
    relations: RelationSchema,
}

impl EntityGraph {
    /// Assemble a graph using the built-in IFC vocabulary and relation table
    pub fn from_entities(header: StepHeader, entities: Vec<Entity>) -> Result<Self, GraphError> {
        Self::with_schema(
            header,
            entities,
            SchemaVocabulary::ifc(),
            RelationSchema::ifc(),
        )
    }

    /// Assemble a graph with explicit schema tables
    pub fn with_schema(
        header: StepHeader,
        entities: Vec<Entity>,
        vocabulary: SchemaVocabulary,
        relations: RelationSchema,
    ) -> Result<Self, GraphError> {
        let mut graph = Self {
            graph: StableGraph::with_capacity(entities.len(), entities.len()),
            index: HashMap::with_capacity(entities.len()),
            order: Vec::with_capacity(entities.len()),
            by_type: HashMap::new(),
            unresolved: HashMap::new(),
            header,
            vocabulary,
            relations,
        };

        for entity in entities {
            let id = entity.id;
            if graph.index.contains_key(&id) {
                return Err(GraphError::DuplicateEntity(id));
            }
            graph
                .by_type
                .entry(entity.type_tag.clone())
                .or_default()
                .push(id);
            let idx = graph.graph.add_node(entity);
            graph.index.insert(id, idx);
            graph.order.push(id);
        }

        graph.link_references();
        Ok(graph)
    }

    /// Turn attribute references into edges once every node exists
    fn link_references(&mut self) {
        let mut pending = Vec::new();
        let mut unresolved = HashMap::new();

        for id in &self.order {
            let Some(&source) = self.index.get(id) else {
                continue;
            };
            let entity = &self.graph[source];
            let rule = self.relations.rule_for(&entity.type_tag).copied();
            let mut dangling = Vec::new();

            for (slot, value) in entity.attributes.iter().enumerate() {
                for target_id in value.references() {
                    let Some(&target) = self.index.get(&target_id) else {
                        // Relationship member slots are pruned on write instead
                        if !rule.is_some_and(|r| r.is_typed_slot(slot)) {
                            dangling.push(target_id);
                        }
                        continue;
                    };

                    let (from, to, kind) = match rule {
                        Some(r) if slot == r.related_slot => {
                            if r.kind.is_spatial() {
                                (source, target, r.kind)
                            } else {
                                (target, source, r.kind)
                            }
                        }
                        Some(r) if slot == r.relating_slot => {
                            if r.kind.is_spatial() {
                                (target, source, r.kind)
                            } else {
                                (source, target, r.kind)
                            }
                        }
                        _ => (source, target, ReferenceKind::Attribute),
                    };
                    pending.push((from, to, EdgeData { kind, slot }));
                }
            }

            if !dangling.is_empty() {
                unresolved.insert(*id, dangling);
            }
        }

        for (from, to, data) in pending {
            self.graph.add_edge(from, to, data);
        }
        self.unresolved = unresolved;
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Get the STEP header the model was loaded with
    pub fn header(&self) -> &StepHeader {
        &self.header
    }

    /// Get the schema identifier (e.g. `IFC4`)
    pub fn schema(&self) -> &str {
        self.header.schema()
    }

    /// Get the subtype vocabulary
    pub fn vocabulary(&self) -> &SchemaVocabulary {
        &self.vocabulary
    }

    /// Get the relationship table
    pub fn relations(&self) -> &RelationSchema {
        &self.relations
    }

    /// Get an entity by id
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.index
            .get(&id)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Check if the graph contains an entity
    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    /// Number of live entities
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of reference edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterate over live entities in load order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|id| self.get(*id))
    }

    /// Entities with exactly this type tag, in load order
    pub fn entities_by_type(&self, tag: &str) -> Vec<&Entity> {
        self.by_type
            .get(&TypeTag::new(tag))
            .map(|ids| ids.iter().filter_map(|id| self.get(*id)).collect())
            .unwrap_or_default()
    }

    /// Entities of this type tag or any of its subtypes, in load order
    pub fn entities_of_kind(&self, tag: &str) -> Vec<&Entity> {
        let target = TypeTag::new(tag);
        let matching: HashSet<&TypeTag> = self
            .by_type
            .keys()
            .filter(|t| self.vocabulary.is_a(t, &target))
            .collect();

        match matching.len() {
            0 => Vec::new(),
            1 => matching
                .into_iter()
                .next()
                .map(|t| self.entities_by_type(t.as_str()))
                .unwrap_or_default(),
            _ => self
                .iter()
                .filter(|e| matching.contains(&e.type_tag))
                .collect(),
        }
    }

    /// Attribute references of an entity that point outside the model
    pub fn unresolved_references(&self, id: EntityId) -> &[EntityId] {
        self.unresolved
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total number of dangling attribute references
    pub fn unresolved_count(&self) -> usize {
        self.unresolved.values().map(Vec::len).sum()
    }

    // ------------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------------

    /// Outgoing neighbors of an entity along the given edge kinds
    pub fn neighbors<'a>(
        &'a self,
        id: EntityId,
        kinds: &'a [ReferenceKind],
    ) -> impl Iterator<Item = (&'a Entity, &'a EdgeData)> + 'a {
        let idx = self.index.get(&id).copied();
        idx.into_iter().flat_map(move |idx| {
            self.graph
                .edges_directed(idx, Direction::Outgoing)
                .filter(move |edge| kinds.contains(&edge.weight().kind))
                .filter_map(move |edge| {
                    let target = self.graph.node_weight(edge.target())?;
                    Some((target, edge.weight()))
                })
        })
    }

    /// Level-bounded breadth-first traversal along the given edge kinds.
    ///
    /// The start id is always the first element, even when it is not part of
    /// the graph. No id appears twice.
    pub fn traverse(
        &self,
        start: EntityId,
        max_levels: usize,
        kinds: &[ReferenceKind],
    ) -> Vec<EntityId> {
        let mut reached = vec![start];
        let Some(&start_idx) = self.index.get(&start) else {
            return reached;
        };

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start_idx, 0usize)]);

        while let Some((idx, depth)) = queue.pop_front() {
            if depth >= max_levels {
                continue;
            }
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                if !kinds.contains(&edge.weight().kind) {
                    continue;
                }
                let target = edge.target();
                let target_id = self.graph[target].id;
                if visited.insert(target_id) {
                    reached.push(target_id);
                    queue.push_back((target, depth + 1));
                }
            }
        }

        reached
    }

    /// Everything an entity needs through plain attribute references
    pub fn structural_dependencies(&self, id: EntityId) -> Vec<EntityId> {
        self.traverse(id, usize::MAX, &[ReferenceKind::Attribute])
    }

    /// Elements contained in a spatial structure, in relationship order
    pub fn containment_of(&self, structure: EntityId) -> Vec<EntityId> {
        let Some(&idx) = self.index.get(&structure) else {
            return Vec::new();
        };

        let mut relationships: Vec<&Entity> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|edge| edge.weight().kind == ReferenceKind::SpatialContainment)
            .map(|edge| &self.graph[edge.target()])
            .collect();
        relationships.sort_by_key(|rel| rel.id);
        relationships.dedup_by_key(|rel| rel.id);

        let mut seen = HashSet::new();
        let mut members = Vec::new();
        for rel in relationships {
            let Some(rule) = self.relations.rule_for(&rel.type_tag) else {
                continue;
            };
            let relating = rel
                .attribute(rule.relating_slot)
                .and_then(Value::as_entity_ref);
            if relating != Some(structure) {
                continue;
            }
            let related = rel
                .attribute(rule.related_slot)
                .map(Value::references)
                .unwrap_or_default();
            for member in related {
                if self.contains(member) && seen.insert(member) {
                    members.push(member);
                }
            }
        }
        members
    }

    /// Relationship entities producing the given edge kind, ordered by id
    pub fn relationships_of_kind(&self, kind: ReferenceKind) -> Vec<&Entity> {
        let mut found: Vec<&Entity> = self
            .relations
            .tags_of_kind(kind)
            .flat_map(|(tag, _)| self.entities_by_type(tag.as_str()))
            .collect();
        found.sort_by_key(|e| e.id);
        found
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Remove an entity from the model.
    ///
    /// Fails while another entity holds a plain attribute reference to it.
    /// References held by relationship entities are scrubbed from those
    /// relationships before the entity is dropped.
    pub fn remove(&mut self, id: EntityId) -> Result<Entity, RemoveError> {
        let idx = *self.index.get(&id).ok_or(RemoveError::NotFound(id))?;

        let holder = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .find(|edge| {
                edge.weight().kind == ReferenceKind::Attribute && edge.source() != idx
            })
            .map(|edge| edge.source());
        if let Some(holder) = holder {
            let by = self.graph[holder].id;
            return Err(RemoveError::StillReferenced { id, by });
        }

        let relationship_neighbors: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|edge| edge.source())
            .chain(
                self.graph
                    .edges_directed(idx, Direction::Outgoing)
                    .filter(|edge| edge.weight().kind != ReferenceKind::Attribute)
                    .map(|edge| edge.target()),
            )
            .filter(|&neighbor| neighbor != idx)
            .collect();

        for neighbor in relationship_neighbors {
            if let Some(entity) = self.graph.node_weight_mut(neighbor) {
                for value in entity.attributes.iter_mut() {
                    value.prune_references(&|target| target != id);
                }
            }
        }

        self.index.remove(&id);
        self.unresolved.remove(&id);
        self.graph
            .remove_node(idx)
            .ok_or(RemoveError::NotFound(id))
    }
}
