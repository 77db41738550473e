//! Cleanup Filter
//!
//! Optional pre-pass that deletes whole categories of non-essential entities
//! from the source model before partitioning. Deletions that the graph
//! refuses (the entity is still referenced) are counted and skipped.

use crate::graph::{EntityGraph, EntityId};
use crate::schema::tags;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A removable category of entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupCategory {
    Annotations,
    Grids,
    Projections,
}

impl CleanupCategory {
    /// All categories in removal order
    pub const ALL: [CleanupCategory; 3] = [
        CleanupCategory::Annotations,
        CleanupCategory::Grids,
        CleanupCategory::Projections,
    ];

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            CleanupCategory::Annotations => "Annotations",
            CleanupCategory::Grids => "Grids",
            CleanupCategory::Projections => "Projections",
        }
    }

    /// Type tags in removal order; grids go before their axes
    pub fn tags(&self) -> &'static [&'static str] {
        match self {
            CleanupCategory::Annotations => &[tags::ANNOTATION],
            CleanupCategory::Grids => &[tags::GRID, tags::GRID_AXIS],
            CleanupCategory::Projections => &[tags::PROJECTION_ELEMENT],
        }
    }
}

/// Which categories to remove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupOptions {
    pub remove_annotations: bool,
    pub remove_grids: bool,
    pub remove_projections: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            remove_annotations: true,
            remove_grids: true,
            remove_projections: true,
        }
    }
}

impl CleanupOptions {
    /// Check whether a category is selected
    pub fn includes(&self, category: CleanupCategory) -> bool {
        match category {
            CleanupCategory::Annotations => self.remove_annotations,
            CleanupCategory::Grids => self.remove_grids,
            CleanupCategory::Projections => self.remove_projections,
        }
    }
}

/// Per-category result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: CleanupCategory,
    pub found: usize,
    pub removed: usize,
}

impl CategoryCount {
    /// Entities that could not be removed
    pub fn failed(&self) -> usize {
        self.found - self.removed
    }
}

/// Result of a cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: usize,
    pub per_category: Vec<CategoryCount>,
}

impl CleanupReport {
    /// Count for one category, if it was selected
    pub fn category(&self, category: CleanupCategory) -> Option<&CategoryCount> {
        self.per_category.iter().find(|c| c.category == category)
    }
}

/// Remove the selected categories from `graph` in place
pub fn clean(graph: &mut EntityGraph, options: &CleanupOptions) -> CleanupReport {
    let mut report = CleanupReport::default();

    for category in CleanupCategory::ALL {
        if !options.includes(category) {
            continue;
        }

        // Collect first, then delete
        let targets: Vec<EntityId> = category
            .tags()
            .iter()
            .flat_map(|tag| graph.entities_of_kind(tag))
            .map(|e| e.id)
            .collect();

        let mut removed = 0;
        for id in &targets {
            match graph.remove(*id) {
                Ok(_) => removed += 1,
                Err(e) => debug!("Could not remove {}: {}", id, e),
            }
        }

        info!(
            "Removed {}/{} {}",
            removed,
            targets.len(),
            category.label().to_lowercase()
        );
        report.removed += removed;
        report.failed += targets.len() - removed;
        report.per_category.push(CategoryCount {
            category,
            found: targets.len(),
            removed,
        });
    }

    report
}
