//! Geometry construction from resolved coordinate sequences.
//!
//! Responsibilities:
//! - Project WGS84 coordinates into the output reference system.
//! - Build lines and rings from way coordinates.
//! - Assemble multipolygon relations from role-tagged way fragments.
//!
//! Invariants:
//! - Builders never panic on malformed input. Every rejection is reported
//!   as a [`GeometryDefect`] so callers can drop the offending geometry and
//!   carry on with its siblings.

use std::collections::HashSet;

use geo::Coord;
use thiserror::Error;

use crate::element::ElementKey;

mod line;
mod multipolygon;
mod project;
mod ring;

pub use line::build_line;
pub use multipolygon::{
    Assembly, AssemblyOptions, EmptyRolePolicy, MemberRole, RoleWay, assemble_multipolygon,
};
pub use project::Projection;
pub use ring::{build_ring, build_way_polygon, close_chain};

/// Why a geometry could not be produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryDefect {
    /// Fewer than two distinct coordinates remained after deduplication.
    #[error("only {distinct} distinct coordinate(s)")]
    TooFewPoints {
        /// Number of distinct coordinates found.
        distinct: usize,
    },
    /// One or more referenced nodes were not in the store.
    #[error("{missing} referenced node(s) are missing")]
    MissingNodes {
        /// Count of unresolved node references.
        missing: usize,
    },
    /// A relation member is not in the store.
    #[error("member {member} is missing")]
    MissingMember {
        /// Key of the absent member.
        member: ElementKey,
    },
    /// A ring candidate's endpoints are further apart than the gap tolerance.
    #[error("ring is open with a gap of {gap}")]
    NotClosed {
        /// Distance between the chain endpoints in projected units.
        gap: f64,
    },
    /// A closed ring had too few points to enclose an area.
    #[error("ring has {points} point(s) and {distinct} distinct coordinate(s)")]
    DegenerateRing {
        /// Number of ring coordinates including the closing point.
        points: usize,
        /// Number of distinct coordinates.
        distinct: usize,
    },
    /// A ring enclosed no area.
    #[error("ring encloses zero area")]
    ZeroArea,
    /// A ring or polygon failed validation, typically by self-intersecting.
    #[error("geometry is not valid")]
    Invalid,
    /// A relation yielded no valid outer ring.
    #[error("no valid outer ring")]
    NoOuterRing,
    /// An outer ring inside another outer could not become one of its holes.
    #[error("outer ring nested inside another outer could not become a hole")]
    NestedOuter,
    /// Two outer rings overlapped and could not be merged into one polygon.
    #[error("overlapping outer rings could not be merged")]
    OverlappingOuter,
    /// An inner ring was not contained by any outer ring.
    #[error("inner ring is not contained by any outer ring")]
    UnassignedInner,
    /// A relation refers back to itself through nested members.
    #[error("relation {relation} is part of a membership cycle")]
    RelationCycle {
        /// Relation at which the cycle was detected.
        relation: i64,
    },
}

impl GeometryDefect {
    /// Stable category name used for defect counters.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::TooFewPoints { .. } => "too_few_points",
            Self::MissingNodes { .. } => "missing_nodes",
            Self::MissingMember { .. } => "missing_member",
            Self::NotClosed { .. } => "not_closed",
            Self::DegenerateRing { .. } => "degenerate_ring",
            Self::ZeroArea => "zero_area",
            Self::Invalid => "invalid",
            Self::NoOuterRing => "no_outer_ring",
            Self::NestedOuter => "nested_outer",
            Self::OverlappingOuter => "overlapping_outer",
            Self::UnassignedInner => "unassigned_inner",
            Self::RelationCycle { .. } => "relation_cycle",
        }
    }
}

/// Drop consecutive repeats, keeping the first of each run.
pub(crate) fn dedup_consecutive(coords: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for coord in coords {
        if out.last() != Some(coord) {
            out.push(*coord);
        }
    }
    out
}

/// Number of distinct coordinates, compared bitwise.
pub(crate) fn distinct_count(coords: &[Coord<f64>]) -> usize {
    coords
        .iter()
        .map(|coord| coord_key(*coord))
        .collect::<HashSet<_>>()
        .len()
}

/// Bitwise identity of a coordinate, suitable for hashing.
pub(crate) fn coord_key(coord: Coord<f64>) -> (u64, u64) {
    // Fold -0.0 into 0.0 so endpoints that differ only in sign still meet.
    let x = if coord.x == 0.0 { 0.0 } else { coord.x };
    let y = if coord.y == 0.0 { 0.0 } else { coord.y };
    (x.to_bits(), y.to_bits())
}
