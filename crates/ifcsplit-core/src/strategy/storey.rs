//! Storey partitions: one partition per `IfcBuildingStorey`.
//!
//! Membership is resolved through a [`StoreyLookup`], an ordered list of
//! tiers. Each tier either answers or reports itself unavailable, in which
//! case the next tier is tried.

use super::{
    claim_unique_name, sanitize_name, type_and_property_closure, ContextPolicy, Partition,
    PartitionKind, PartitionStrategy,
};
use crate::closure::ClosurePolicy;
use crate::graph::{Entity, EntityGraph, EntityId, ReferenceKind, Value};
use crate::schema::tags;
use crate::splitter::SplitError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a membership tier could not answer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("no spatial containment relationship is configured")]
    NoContainmentRelation,

    #[error("storey {0} has no name to match on")]
    Unnamed(EntityId),
}

/// A way of finding the elements located in a storey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    /// Containment relationships whose relating structure is the storey itself
    Identity,
    /// Containment relationships whose relating structure has the storey's name
    Name,
}

impl MembershipTier {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipTier::Identity => "identity",
            MembershipTier::Name => "name",
        }
    }

    fn members(&self, graph: &EntityGraph, storey: &Entity) -> Result<Vec<EntityId>, LookupError> {
        if !graph.relations().has_kind(ReferenceKind::SpatialContainment) {
            return Err(LookupError::NoContainmentRelation);
        }
        match self {
            MembershipTier::Identity => Ok(graph.containment_of(storey.id)),
            MembershipTier::Name => name_members(graph, storey),
        }
    }
}

impl fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "identity" => Ok(MembershipTier::Identity),
            "name" => Ok(MembershipTier::Name),
            _ => Err(format!(
                "Invalid storey lookup tier: {}. Valid values: identity, name",
                s
            )),
        }
    }
}

fn name_members(graph: &EntityGraph, storey: &Entity) -> Result<Vec<EntityId>, LookupError> {
    let name = storey.name().ok_or(LookupError::Unnamed(storey.id))?;

    let mut seen = HashSet::new();
    let mut members = Vec::new();
    for rel in graph.relationships_of_kind(ReferenceKind::SpatialContainment) {
        let Some(rule) = graph.relations().rule_for(&rel.type_tag) else {
            continue;
        };
        let relating_name = rel
            .attribute(rule.relating_slot)
            .and_then(Value::as_entity_ref)
            .and_then(|id| graph.get(id))
            .and_then(Entity::name);
        if relating_name.as_deref() != Some(name.as_str()) {
            continue;
        }
        let related = rel
            .attribute(rule.related_slot)
            .map(Value::references)
            .unwrap_or_default();
        for member in related {
            if graph.contains(member) && seen.insert(member) {
                members.push(member);
            }
        }
    }
    Ok(members)
}

/// Ordered membership tiers for storeys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreyLookup {
    tiers: Vec<MembershipTier>,
}

impl Default for StoreyLookup {
    fn default() -> Self {
        Self::new(vec![MembershipTier::Identity, MembershipTier::Name])
    }
}

impl StoreyLookup {
    /// Create a lookup trying `tiers` in order
    pub fn new(tiers: Vec<MembershipTier>) -> Self {
        Self { tiers }
    }

    /// Get the tier order
    pub fn tiers(&self) -> &[MembershipTier] {
        &self.tiers
    }

    /// Members of a storey from the first tier able to answer
    pub fn members(
        &self,
        graph: &EntityGraph,
        storey: &Entity,
    ) -> Option<(MembershipTier, Vec<EntityId>)> {
        for tier in &self.tiers {
            match tier.members(graph, storey) {
                Ok(members) => return Some((*tier, members)),
                Err(e) => debug!("Storey {}: {} lookup unavailable: {}", storey.id, tier, e),
            }
        }
        None
    }
}

/// One partition per building storey
#[derive(Debug, Clone)]
pub struct StoreyStrategy {
    lookup: StoreyLookup,
    closure: ClosurePolicy,
}

impl Default for StoreyStrategy {
    fn default() -> Self {
        Self::new(StoreyLookup::default(), type_and_property_closure())
    }
}

impl StoreyStrategy {
    /// Create a storey strategy
    pub fn new(lookup: StoreyLookup, closure: ClosurePolicy) -> Self {
        Self { lookup, closure }
    }
}

impl PartitionStrategy for StoreyStrategy {
    fn kind(&self) -> PartitionKind {
        PartitionKind::Storey
    }

    fn closure_policy(&self) -> &ClosurePolicy {
        &self.closure
    }

    fn context_policy(&self) -> ContextPolicy {
        ContextPolicy {
            extra_tags: Vec::new(),
            include_anchor: true,
        }
    }

    fn assign(&self, graph: &EntityGraph) -> Result<Vec<Partition>, SplitError> {
        let storeys = graph.entities_of_kind(tags::BUILDING_STOREY);
        let mut used_names = HashSet::new();
        let mut partitions = Vec::with_capacity(storeys.len());

        for storey in storeys {
            let label = storey
                .name()
                .unwrap_or_else(|| format!("Storey_{}", storey.id.0));
            let mut name = sanitize_name(&label);
            if name.is_empty() {
                name = format!("Storey_{}", storey.id.0);
            }
            let name = claim_unique_name(&mut used_names, name, storey.id.0);

            let roots = match self.lookup.members(graph, storey) {
                Some((tier, members)) => {
                    debug!(
                        "Storey '{}' ({}): {} members via {} lookup",
                        label,
                        storey.id,
                        members.len(),
                        tier
                    );
                    members
                }
                None => {
                    warn!(
                        "Storey '{}' ({}): no membership lookup available",
                        label, storey.id
                    );
                    Vec::new()
                }
            };

            partitions.push(
                Partition::new(name, label, PartitionKind::Storey, roots).with_anchor(storey.id),
            );
        }

        Ok(partitions)
    }
}
