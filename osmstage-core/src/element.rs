//! Raw OpenStreetMap elements as they leave the decoder.
//!
//! Elements never own each other: ways hold node ids and relations hold
//! [`MemberRef`] values. Geometry is resolved through the element store at
//! build time.

use std::collections::BTreeMap;
use std::fmt;

use geo::Coord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Free-form key/value tags. Ordered so that derived rows serialise
/// deterministically.
pub type Tags = BTreeMap<String, String>;

/// Discriminates the three OSM element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// A point with coordinates.
    Node,
    /// An ordered list of node references.
    Way,
    /// A collection of role-tagged members.
    Relation,
}

impl ElementKind {
    /// Single-letter prefix used in log output (`n`, `w`, `r`).
    #[must_use]
    pub const fn prefix(self) -> char {
        match self {
            Self::Node => 'n',
            Self::Way => 'w',
            Self::Relation => 'r',
        }
    }
}

/// Address of an element in the store: `(kind, id)`.
///
/// Ids are only unique within a kind, so a way and a relation may share
/// the same numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementKey {
    /// Element kind.
    pub kind: ElementKind,
    /// OSM identifier.
    pub id: i64,
}

impl ElementKey {
    /// Key of a node.
    #[must_use]
    pub const fn node(id: i64) -> Self {
        Self {
            kind: ElementKind::Node,
            id,
        }
    }

    /// Key of a way.
    #[must_use]
    pub const fn way(id: i64) -> Self {
        Self {
            kind: ElementKind::Way,
            id,
        }
    }

    /// Key of a relation.
    #[must_use]
    pub const fn relation(id: i64) -> Self {
        Self {
            kind: ElementKind::Relation,
            id,
        }
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.id)
    }
}

/// Errors returned by element constructors.
#[derive(Debug, Error, PartialEq)]
pub enum ElementError {
    /// Longitude or latitude was not a finite WGS84 value.
    #[error("node {id} has invalid coordinates ({lon}, {lat})")]
    InvalidCoordinate {
        /// Node identifier.
        id: i64,
        /// Longitude as decoded.
        lon: f64,
        /// Latitude as decoded.
        lat: f64,
    },
}

/// A tagged point.
///
/// Coordinates are WGS84 with `lon` in `-180..=180` and `lat` in `-90..=90`.
///
/// # Examples
/// ```
/// use osmstage_core::{Node, Tags};
///
/// # fn main() -> Result<(), osmstage_core::ElementError> {
/// let node = Node::new(1, 13.4, 52.5, Tags::new())?;
/// assert_eq!(node.coord().x, 13.4);
/// assert!(Node::new(2, f64::NAN, 0.0, Tags::new()).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// OSM identifier.
    pub id: i64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
    /// Node tags, often empty.
    #[serde(default)]
    pub tags: Tags,
}

impl Node {
    /// Validate coordinates and construct a [`Node`].
    pub fn new(id: i64, lon: f64, lat: f64, tags: Tags) -> Result<Self, ElementError> {
        let valid = lon.is_finite()
            && lat.is_finite()
            && (-180.0..=180.0).contains(&lon)
            && (-90.0..=90.0).contains(&lat);
        if !valid {
            return Err(ElementError::InvalidCoordinate { id, lon, lat });
        }
        Ok(Self { id, lon, lat, tags })
    }

    /// The node position as `x = lon`, `y = lat`.
    #[must_use]
    pub const fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }
}

/// An ordered list of node references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Way {
    /// OSM identifier.
    pub id: i64,
    /// Referenced node ids in order. May be empty or contain repeats.
    #[serde(default)]
    pub refs: Vec<i64>,
    /// Way tags.
    #[serde(default)]
    pub tags: Tags,
}

impl Way {
    /// Construct a [`Way`].
    #[must_use]
    pub const fn new(id: i64, refs: Vec<i64>, tags: Tags) -> Self {
        Self { id, refs, tags }
    }

    /// True when the way starts and ends on the same node id and has more
    /// than one reference.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match (self.refs.first(), self.refs.last()) {
            (Some(first), Some(last)) => self.refs.len() > 1 && first == last,
            _ => false,
        }
    }
}

/// Target of a relation member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberRef {
    /// Member node.
    Node(i64),
    /// Member way.
    Way(i64),
    /// Nested relation.
    Relation(i64),
}

impl MemberRef {
    /// Store key of the referenced element.
    #[must_use]
    pub const fn key(self) -> ElementKey {
        match self {
            Self::Node(id) => ElementKey::node(id),
            Self::Way(id) => ElementKey::way(id),
            Self::Relation(id) => ElementKey::relation(id),
        }
    }
}

/// A relation member with its role string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawMember", into = "RawMember")]
pub struct Member {
    /// Referenced element.
    pub target: MemberRef,
    /// Role such as `outer`, `inner` or the empty string.
    pub role: String,
}

impl Member {
    /// Construct a member from a target and role.
    pub fn new(target: MemberRef, role: impl Into<String>) -> Self {
        Self {
            target,
            role: role.into(),
        }
    }

    /// Shorthand for a way member.
    pub fn way(id: i64, role: impl Into<String>) -> Self {
        Self::new(MemberRef::Way(id), role)
    }
}

/// Flat wire form of [`Member`]: `{"type": "way", "ref": 12, "role": "outer"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMember {
    #[serde(rename = "type")]
    kind: ElementKind,
    #[serde(rename = "ref")]
    id: i64,
    #[serde(default)]
    role: String,
}

impl From<RawMember> for Member {
    fn from(raw: RawMember) -> Self {
        let target = match raw.kind {
            ElementKind::Node => MemberRef::Node(raw.id),
            ElementKind::Way => MemberRef::Way(raw.id),
            ElementKind::Relation => MemberRef::Relation(raw.id),
        };
        Self {
            target,
            role: raw.role,
        }
    }
}

impl From<Member> for RawMember {
    fn from(member: Member) -> Self {
        let key = member.target.key();
        Self {
            kind: key.kind,
            id: key.id,
            role: member.role,
        }
    }
}

/// A tagged collection of members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// OSM identifier.
    pub id: i64,
    /// Members in declared order.
    #[serde(default)]
    pub members: Vec<Member>,
    /// Relation tags.
    #[serde(default)]
    pub tags: Tags,
}

impl Relation {
    /// Construct a [`Relation`].
    #[must_use]
    pub const fn new(id: i64, members: Vec<Member>, tags: Tags) -> Self {
        Self { id, members, tags }
    }

    /// Value of the `type` tag, if any.
    #[must_use]
    pub fn relation_type(&self) -> Option<&str> {
        self.tags.get("type").map(String::as_str)
    }

    /// True when the relation carries no tags besides `type`.
    #[must_use]
    pub fn has_only_type_tag(&self) -> bool {
        self.tags.keys().all(|key| key == "type")
    }
}

/// Any decoded element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    /// A node.
    Node(Node),
    /// A way.
    Way(Way),
    /// A relation.
    Relation(Relation),
}

impl Element {
    /// Store key of this element.
    #[must_use]
    pub const fn key(&self) -> ElementKey {
        match self {
            Self::Node(node) => ElementKey::node(node.id),
            Self::Way(way) => ElementKey::way(way.id),
            Self::Relation(relation) => ElementKey::relation(relation.id),
        }
    }

    /// Tags of this element.
    #[must_use]
    pub const fn tags(&self) -> &Tags {
        match self {
            Self::Node(node) => &node.tags,
            Self::Way(way) => &way.tags,
            Self::Relation(relation) => &relation.tags,
        }
    }
}

impl From<Node> for Element {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<Way> for Element {
    fn from(way: Way) -> Self {
        Self::Way(way)
    }
}

impl From<Relation> for Element {
    fn from(relation: Relation) -> Self {
        Self::Relation(relation)
    }
}
