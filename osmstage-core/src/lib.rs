//! Core domain types and pure algorithms for osmstage.
//!
//! This crate knows nothing about files, databases or threads. It models
//! OpenStreetMap elements, classifies them against a declarative mapping,
//! builds and assembles their geometries, and simplifies those geometries
//! for generalized tables. The `osmstage-data` crate drives these pieces
//! through the import pipeline.
//!
//! # Examples
//!
//! ```
//! use osmstage_core::{ElementKind, TagClassifier, Tags};
//!
//! # fn main() -> Result<(), osmstage_core::MappingError> {
//! let classifier = TagClassifier::from_json_str(
//!     r#"{"tables": [{"name": "osm_amenities", "type": "point",
//!         "mapping": [{"key": "amenity", "values": ["police"]}]}]}"#,
//! )?;
//! let mut tags = Tags::new();
//! tags.insert("amenity".into(), "police".into());
//! let decisions = classifier.classify(ElementKind::Node, &tags);
//! assert_eq!(decisions.len(), 1);
//! assert_eq!(decisions[0].type_label, "police");
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod element;
pub mod generalize;
pub mod geometry;
pub mod mapping;
mod row;

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-support")))]
pub mod test_support;

pub use element::{
    Element, ElementError, ElementKey, ElementKind, Member, MemberRef, Node, Relation, Tags, Way,
};
pub use generalize::Generalizer;
pub use geometry::{GeometryDefect, Projection};
pub use mapping::{Classification, MappingConfig, MappingError, TableKind, TableSpec, TagClassifier};
pub use row::{Detail, OutputRow, row_id};
