//! Reverse dependency index: which elements are built from which.

use std::collections::{BTreeSet, VecDeque};

use osmstage_core::{ElementKey, ElementKind};

use super::shard::ShardedMap;

/// Reverse containment edges keyed by the contained element.
///
/// An edge `node n1 -> way w7` records that way 7 references node 1. Edges
/// form a set, so inserting the same edge twice has no further effect.
#[derive(Debug, Default)]
pub struct DependencyIndex {
    edges: ShardedMap<ElementKey, BTreeSet<ElementKey>>,
}

impl DependencyIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent` is built from `target`. Returns `false` when
    /// the edge was already present.
    pub fn insert(&self, target: ElementKey, dependent: ElementKey) -> bool {
        self.edges
            .write(&target)
            .entry(target)
            .or_default()
            .insert(dependent)
    }

    /// Drop the edge `target -> dependent`. Returns `false` when absent.
    pub fn remove(&self, target: ElementKey, dependent: ElementKey) -> bool {
        let mut shard = self.edges.write(&target);
        let Some(dependents) = shard.get_mut(&target) else {
            return false;
        };
        let removed = dependents.remove(&dependent);
        if dependents.is_empty() {
            shard.remove(&target);
        }
        removed
    }

    /// Elements that reference `target` directly.
    #[must_use]
    pub fn direct_dependents(&self, target: ElementKey) -> BTreeSet<ElementKey> {
        self.edges.get(&target).unwrap_or_default()
    }

    /// Relations that list `target` as a member.
    #[must_use]
    pub fn parent_relations(&self, target: ElementKey) -> BTreeSet<ElementKey> {
        let mut parents = self.direct_dependents(target);
        parents.retain(|key| key.kind == ElementKind::Relation);
        parents
    }

    /// Every element whose geometry transitively includes `target`.
    ///
    /// `target` itself is only part of the result when a relation cycle
    /// leads back to it.
    #[must_use]
    pub fn dependents(&self, target: ElementKey) -> BTreeSet<ElementKey> {
        let mut closure = BTreeSet::new();
        let mut queue = VecDeque::from([target]);
        while let Some(current) = queue.pop_front() {
            for dependent in self.direct_dependents(current) {
                if closure.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }
        closure
    }

    /// Total number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        let mut count = 0;
        self.edges.for_each(|_, dependents| count += dependents.len());
        count
    }
}
