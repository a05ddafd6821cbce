//! Element and mapping builders shared by unit and behaviour tests.
//!
//! Coordinates are given in degrees. The fixture mapping mirrors a small
//! but complete rendering schema: roads, land use, buildings, boundaries,
//! water and two point tables.

use crate::element::{Member, MemberRef, Node, Relation, Tags, Way};
use crate::mapping::{MappingError, TagClassifier};

/// Mapping used by the behaviour suites.
pub const FIXTURE_MAPPING: &str = r#"{
    "tables": [
        {
            "name": "osm_roads",
            "type": "linestring",
            "mapping": [
                {"key": "highway", "values": ["__any__"]},
                {"key": "railway", "values": ["tram", "rail"]}
            ],
            "columns": [{"type": "tag", "name": "name", "key": "name"}],
            "generalized": [
                {"tolerance": 50.0, "types": ["motorway", "trunk", "primary", "secondary"]},
                {"tolerance": 200.0, "types": ["motorway", "trunk", "primary"]}
            ]
        },
        {
            "name": "osm_landusages",
            "type": "polygon",
            "mapping": [
                {"key": "landuse", "values": ["__any__"]},
                {"key": "leisure", "values": ["park"]}
            ],
            "columns": [
                {"type": "tag", "name": "name", "key": "name"},
                {"type": "enumerate", "name": "enum", "key": "landuse",
                 "values": ["park", "forest", "farmland", "farmyard", "farm", "meadow",
                            "grass", "residential", "retail", "commercial", "industrial",
                            "cemetery", "allotments", "scrub", "wood"]}
            ],
            "generalized": [{"tolerance": 50.0}, {"tolerance": 200.0}]
        },
        {
            "name": "osm_buildings",
            "type": "polygon",
            "mapping": [{"key": "building", "values": ["__any__"]}],
            "reject": {"building": ["no"]},
            "columns": [{"type": "tag", "name": "name", "key": "name"}]
        },
        {
            "name": "osm_admin",
            "type": "polygon",
            "mapping": [{"key": "boundary", "values": ["administrative"]}],
            "columns": [
                {"type": "tag", "name": "name", "key": "name"},
                {"type": "tag", "name": "admin_level", "key": "admin_level"}
            ]
        },
        {
            "name": "osm_waterareas",
            "type": "polygon",
            "mapping": [
                {"key": "natural", "values": ["water"]},
                {"key": "waterway", "values": ["riverbank"]}
            ],
            "generalized": [{"tolerance": 50.0}, {"tolerance": 200.0}]
        },
        {
            "name": "osm_amenities",
            "type": "point",
            "mapping": [{"key": "amenity", "values": ["police", "fire_station", "school"]}],
            "columns": [{"type": "tag", "name": "name", "key": "name"}]
        },
        {
            "name": "osm_barrierpoints",
            "type": "point",
            "mapping": [{"key": "barrier", "values": ["block", "bollard", "gate"]}]
        }
    ]
}"#;

/// Compile [`FIXTURE_MAPPING`].
pub fn fixture_classifier() -> Result<TagClassifier, MappingError> {
    TagClassifier::from_json_str(FIXTURE_MAPPING)
}

/// Build a tag map from pairs.
#[must_use]
pub fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|&(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

/// Untagged node. Coordinates are not validated.
#[must_use]
pub fn node(id: i64, lon: f64, lat: f64) -> Node {
    Node {
        id,
        lon,
        lat,
        tags: Tags::new(),
    }
}

/// Tagged node. Coordinates are not validated.
#[must_use]
pub fn tagged_node(id: i64, lon: f64, lat: f64, pairs: &[(&str, &str)]) -> Node {
    Node {
        tags: tags(pairs),
        ..node(id, lon, lat)
    }
}

/// Way over `refs`.
#[must_use]
pub fn way(id: i64, refs: &[i64], pairs: &[(&str, &str)]) -> Way {
    Way::new(id, refs.to_vec(), tags(pairs))
}

/// Relation with `members`.
#[must_use]
pub fn relation(id: i64, members: Vec<Member>, pairs: &[(&str, &str)]) -> Relation {
    Relation::new(id, members, tags(pairs))
}

/// Outer way member.
#[must_use]
pub fn outer(way_id: i64) -> Member {
    Member::way(way_id, "outer")
}

/// Inner way member.
#[must_use]
pub fn inner(way_id: i64) -> Member {
    Member::way(way_id, "inner")
}

/// Nested relation member.
#[must_use]
pub fn sub_relation(relation_id: i64) -> Member {
    Member::new(MemberRef::Relation(relation_id), "")
}

/// Four corner nodes of an axis-aligned square, counter-clockwise from the
/// south-west corner, numbered `first_id..first_id + 4`.
#[must_use]
pub fn square_nodes(first_id: i64, lon: f64, lat: f64, size: f64) -> Vec<Node> {
    vec![
        node(first_id, lon, lat),
        node(first_id + 1, lon + size, lat),
        node(first_id + 2, lon + size, lat + size),
        node(first_id + 3, lon, lat + size),
    ]
}

/// Node ids of a closed ring over the square built by [`square_nodes`].
#[must_use]
pub const fn square_ring(first_id: i64) -> [i64; 5] {
    [first_id, first_id + 1, first_id + 2, first_id + 3, first_id]
}
