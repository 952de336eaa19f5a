//! Dependency graph recorded from observed loads
//!
//! Edges point from a dependency to the units that loaded it, which is the
//! direction reloads propagate in. The graph only grows while tracking is
//! enabled. An edge that no longer matches the source just causes one extra
//! reload.

use std::collections::HashMap;

use crate::unit::UnitName;

/// Dependency name -> dependents, in the order they were first recorded
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    dependents: HashMap<UnitName, Vec<UnitName>>,
    edges: usize,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent` loaded `dependency`.
    ///
    /// Returns `false` if the edge was already known.
    pub fn add_edge(&mut self, dependency: UnitName, dependent: UnitName) -> bool {
        let entry = self.dependents.entry(dependency).or_default();
        if entry.contains(&dependent) {
            return false;
        }
        entry.push(dependent);
        self.edges += 1;
        true
    }

    /// Units recorded as depending on `dependency`
    pub fn dependents_of(&self, dependency: &str) -> Option<&[UnitName]> {
        self.dependents.get(dependency).map(Vec::as_slice)
    }

    pub fn has_edge(&self, dependency: &str, dependent: &str) -> bool {
        self.dependents
            .get(dependency)
            .map_or(false, |deps| deps.iter().any(|d| d == dependent))
    }

    /// Number of distinct edges
    pub fn edge_count(&self) -> usize {
        self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }

    pub fn clear(&mut self) {
        self.dependents.clear();
        self.edges = 0;
    }
}
