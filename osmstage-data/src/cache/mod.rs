//! Element store: the persistent cache of decoded elements.
//!
//! Responsibilities:
//! - Hold nodes, ways and relations addressable by `(kind, id)`.
//! - Keep the [`DependencyIndex`] in step with every write.
//! - Resolve way node references into coordinates.
//!
//! Invariants:
//! - Every stored way has one edge per referenced node, every stored
//!   relation one edge per member, and no other edges exist.
//! - Concurrent readers never observe a partially written element.
//! - An element is swapped and its edges rewired under the element's shard
//!   lock, so concurrent writes of one key leave the edges of the last
//!   writer only. Element shards are always locked before index shards.

use std::collections::BTreeSet;

use geo::Coord;
use osmstage_core::{Element, ElementKey, ElementKind, Node, Relation, Way};

mod deps;
mod shard;
mod snapshot;

pub use deps::DependencyIndex;
pub use snapshot::{CacheError, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};

use shard::ShardedMap;

/// Coordinates of a way's nodes in reference order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedWay {
    /// Coordinates of the nodes that were found.
    pub coords: Vec<Coord<f64>>,
    /// Referenced node ids missing from the store.
    pub missing: Vec<i64>,
}

impl ResolvedWay {
    /// True when every referenced node was found.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Sharded in-memory element store with a reverse dependency index.
///
/// # Examples
/// ```
/// use osmstage_core::{Element, ElementKey, Node, Tags, Way};
/// use osmstage_data::ElementStore;
///
/// # fn main() -> Result<(), osmstage_core::ElementError> {
/// let store = ElementStore::new();
/// store.put(Element::Node(Node::new(1, 0.0, 0.0, Tags::new())?));
/// store.put(Element::Node(Node::new(2, 1.0, 0.0, Tags::new())?));
/// store.put(Element::Way(Way::new(10, vec![1, 2], Tags::new())));
///
/// let dependents = store.dependents(ElementKey::node(1));
/// assert!(dependents.contains(&ElementKey::way(10)));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ElementStore {
    nodes: ShardedMap<i64, Node>,
    ways: ShardedMap<i64, Way>,
    relations: ShardedMap<i64, Relation>,
    dependencies: DependencyIndex,
}

impl ElementStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `element`, replacing any element with the same key, and
    /// rewire its dependency edges. Returns the replaced element.
    pub fn put(&self, element: Element) -> Option<Element> {
        let key = element.key();
        let members = member_keys(&element);
        match element {
            Element::Node(node) => self.swap(&self.nodes, key, Some(node), Element::Node, members),
            Element::Way(way) => self.swap(&self.ways, key, Some(way), Element::Way, members),
            Element::Relation(relation) => self.swap(
                &self.relations,
                key,
                Some(relation),
                Element::Relation,
                members,
            ),
        }
    }

    /// Remove the element at `key` and prune the edges it introduced.
    ///
    /// Edges pointing at the removed element stay: the elements that still
    /// reference it must be rebuilt and now see it as missing.
    pub fn delete(&self, key: ElementKey) -> Option<Element> {
        match key.kind {
            ElementKind::Node => self.swap(&self.nodes, key, None, Element::Node, Vec::new()),
            ElementKind::Way => self.swap(&self.ways, key, None, Element::Way, Vec::new()),
            ElementKind::Relation => {
                self.swap(&self.relations, key, None, Element::Relation, Vec::new())
            }
        }
    }

    /// Replace or remove the value at `key` and move its edges from the old
    /// members to `members`, all while holding the element's shard lock.
    fn swap<V>(
        &self,
        map: &ShardedMap<i64, V>,
        key: ElementKey,
        value: Option<V>,
        wrap: fn(V) -> Element,
        members: Vec<ElementKey>,
    ) -> Option<Element> {
        let mut shard = map.write(&key.id);
        let previous = match value {
            Some(value) => shard.insert(key.id, value),
            None => shard.remove(&key.id),
        }
        .map(wrap);
        if let Some(old) = &previous {
            for member in member_keys(old) {
                self.dependencies.remove(member, key);
            }
        }
        for member in members {
            self.dependencies.insert(member, key);
        }
        drop(shard);
        previous
    }

    /// Element stored at `key`.
    #[must_use]
    pub fn get(&self, key: ElementKey) -> Option<Element> {
        match key.kind {
            ElementKind::Node => self.node(key.id).map(Element::Node),
            ElementKind::Way => self.way(key.id).map(Element::Way),
            ElementKind::Relation => self.relation(key.id).map(Element::Relation),
        }
    }

    /// Node `id`.
    #[must_use]
    pub fn node(&self, id: i64) -> Option<Node> {
        self.nodes.get(&id)
    }

    /// Way `id`.
    #[must_use]
    pub fn way(&self, id: i64) -> Option<Way> {
        self.ways.get(&id)
    }

    /// Relation `id`.
    #[must_use]
    pub fn relation(&self, id: i64) -> Option<Relation> {
        self.relations.get(&id)
    }

    /// Whether an element is stored at `key`.
    #[must_use]
    pub fn contains(&self, key: ElementKey) -> bool {
        match key.kind {
            ElementKind::Node => self.nodes.contains_key(&key.id),
            ElementKind::Way => self.ways.contains_key(&key.id),
            ElementKind::Relation => self.relations.contains_key(&key.id),
        }
    }

    /// Look up the coordinates of every node `way` references.
    ///
    /// Missing nodes are reported, not fatal.
    #[must_use]
    pub fn resolve_way(&self, way: &Way) -> ResolvedWay {
        let mut resolved = ResolvedWay::default();
        for &node_id in &way.refs {
            match self.nodes.read(&node_id).get(&node_id) {
                Some(node) => resolved.coords.push(node.coord()),
                None => resolved.missing.push(node_id),
            }
        }
        resolved
    }

    /// Transitive dependents of `key`.
    #[must_use]
    pub fn dependents(&self, key: ElementKey) -> BTreeSet<ElementKey> {
        self.dependencies.dependents(key)
    }

    /// Relations that list `key` as a direct member.
    #[must_use]
    pub fn parent_relations(&self, key: ElementKey) -> BTreeSet<ElementKey> {
        self.dependencies.parent_relations(key)
    }

    /// The dependency index.
    #[must_use]
    pub const fn dependencies(&self) -> &DependencyIndex {
        &self.dependencies
    }

    /// Sorted ids of every element of `kind`.
    #[must_use]
    pub fn ids(&self, kind: ElementKind) -> Vec<i64> {
        let mut ids = Vec::with_capacity(self.count(kind));
        match kind {
            ElementKind::Node => self.nodes.for_each(|id, _| ids.push(*id)),
            ElementKind::Way => self.ways.for_each(|id, _| ids.push(*id)),
            ElementKind::Relation => self.relations.for_each(|id, _| ids.push(*id)),
        }
        ids.sort_unstable();
        ids
    }

    /// Number of stored elements of `kind`.
    #[must_use]
    pub fn count(&self, kind: ElementKind) -> usize {
        match kind {
            ElementKind::Node => self.nodes.len(),
            ElementKind::Way => self.ways.len(),
            ElementKind::Relation => self.relations.len(),
        }
    }
}

/// Keys of the elements `element` is built from, in member order.
fn member_keys(element: &Element) -> Vec<ElementKey> {
    match element {
        Element::Node(_) => Vec::new(),
        Element::Way(way) => way.refs.iter().copied().map(ElementKey::node).collect(),
        Element::Relation(relation) => relation
            .members
            .iter()
            .map(|member| member.target.key())
            .collect(),
    }
}
