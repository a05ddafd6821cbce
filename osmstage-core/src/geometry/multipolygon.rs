//! Multipolygon assembly from role-tagged way fragments.
//!
//! Fragments are merged into chains on shared endpoints, chains are closed
//! into rings (snapping small gaps), and inner rings are attached to the
//! smallest outer ring that contains them. Outer rings that end up nested
//! inside or overlapping each other are then settled: a nested outer
//! becomes a hole, overlapping outers are merged by union. Every rejected
//! fragment or ring is recorded as a [`GeometryDefect`]; the relation only
//! fails when no outer ring survives.

use std::collections::{HashMap, VecDeque};

use geo::{
    Area, BooleanOps, BoundingRect, Contains, Coord, Intersects, LineString, MultiPolygon,
    Polygon, Validation,
};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};
use serde::{Deserialize, Serialize};

use super::ring::{build_ring, close_chain};
use super::{GeometryDefect, coord_key, dedup_consecutive, distinct_count};

/// Polarity requested by a member's role string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    /// `outer`
    Outer,
    /// `inner`
    Inner,
    /// The empty role.
    Unmarked,
}

impl MemberRole {
    /// Parse a role string. Roles other than `outer`, `inner` and the empty
    /// string do not take part in polygon assembly.
    #[must_use]
    pub fn parse(role: &str) -> Option<Self> {
        match role.trim() {
            "outer" => Some(Self::Outer),
            "inner" => Some(Self::Inner),
            "" => Some(Self::Unmarked),
            _ => None,
        }
    }
}

/// How members with an empty role are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyRolePolicy {
    /// Always outer.
    Outer,
    /// Outer when the relation has no inner members; otherwise decided per
    /// ring by containment.
    #[default]
    Infer,
    /// Skipped.
    Ignore,
}

/// Tuning knobs for [`assemble_multipolygon`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblyOptions {
    /// Largest endpoint distance that is still closed into a ring.
    pub gap_tolerance: f64,
    /// Treatment of empty-role members.
    pub empty_role: EmptyRolePolicy,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            gap_tolerance: 0.5,
            empty_role: EmptyRolePolicy::default(),
        }
    }
}

/// A resolved way member ready for assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleWay {
    /// Source way id.
    pub way_id: i64,
    /// Requested polarity.
    pub role: MemberRole,
    /// Projected coordinates in way order.
    pub coords: Vec<Coord<f64>>,
}

/// Outcome of assembling one relation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Assembly {
    /// Assembled polygons ordered by outer ring area, largest first. `None`
    /// when no outer ring survived.
    pub geometry: Option<MultiPolygon<f64>>,
    /// Ways forming the emitted outer rings, largest ring first.
    pub outer_ways: Vec<i64>,
    /// Ways forming the emitted inner rings.
    pub inner_ways: Vec<i64>,
    /// Everything that was dropped along the way.
    pub defects: Vec<GeometryDefect>,
}

impl Assembly {
    /// Every way that contributed a ring to the emitted geometry.
    pub fn ring_ways(&self) -> impl Iterator<Item = i64> + '_ {
        self.outer_ways.iter().chain(&self.inner_ways).copied()
    }
}

#[derive(Debug, Clone)]
struct Chain {
    coords: Vec<Coord<f64>>,
    ways: Vec<i64>,
}

impl Chain {
    fn first(&self) -> Coord<f64> {
        self.coords.first().copied().unwrap_or_default()
    }

    fn last(&self) -> Coord<f64> {
        self.coords.last().copied().unwrap_or_default()
    }

    fn is_closed(&self) -> bool {
        self.coords.len() > 2 && coord_key(self.first()) == coord_key(self.last())
    }

    fn reverse(&mut self) {
        self.coords.reverse();
    }

    fn append(&mut self, mut other: Self) {
        if coord_key(other.first()) != coord_key(self.last()) {
            other.reverse();
        }
        self.coords.extend(other.coords.into_iter().skip(1));
        self.ways.extend(other.ways);
    }

    fn prepend(&mut self, mut other: Self) {
        if coord_key(other.last()) != coord_key(self.first()) {
            other.reverse();
        }
        other.coords.extend(self.coords.drain(..).skip(1));
        other.ways.append(&mut self.ways);
        *self = other;
    }
}

#[derive(Debug, Clone)]
struct Ring {
    polygon: Polygon<f64>,
    area: f64,
    ways: Vec<i64>,
}

/// One polygon of the result with the ways behind its rings.
#[derive(Debug, Clone)]
struct Part {
    polygon: Polygon<f64>,
    outer_ways: Vec<i64>,
    inner_ways: Vec<i64>,
}

impl Part {
    fn from_rings(outer: Ring, holes: Vec<Ring>) -> Self {
        let (exterior, _) = outer.polygon.into_inner();
        let mut interiors = Vec::with_capacity(holes.len());
        let mut inner_ways = Vec::new();
        for hole in holes {
            inner_ways.extend(hole.ways);
            let (ring, _) = hole.polygon.into_inner();
            interiors.push(ring);
        }
        Self {
            polygon: Polygon::new(exterior, interiors),
            outer_ways: outer.ways,
            inner_ways,
        }
    }

    fn area(&self) -> f64 {
        self.polygon.unsigned_area()
    }

    /// True when the two parts cannot sit side by side in one multipolygon.
    fn conflicts_with(&self, other: &Self) -> bool {
        let (Some(mine), Some(theirs)) = (self.polygon.bounding_rect(), other.polygon.bounding_rect())
        else {
            return false;
        };
        mine.intersects(&theirs)
            && !MultiPolygon::new(vec![self.polygon.clone(), other.polygon.clone()]).is_valid()
    }
}

/// Assemble a multipolygon from way members.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osmstage_core::geometry::{AssemblyOptions, MemberRole, RoleWay, assemble_multipolygon};
///
/// let c = |x: f64, y: f64| Coord { x, y };
/// let members = vec![
///     RoleWay { way_id: 1, role: MemberRole::Outer, coords: vec![c(0.0, 0.0), c(10.0, 0.0), c(10.0, 10.0)] },
///     RoleWay { way_id: 2, role: MemberRole::Outer, coords: vec![c(10.0, 10.0), c(0.0, 10.0), c(0.0, 0.0)] },
/// ];
/// let assembly = assemble_multipolygon(&members, &AssemblyOptions::default());
/// assert_eq!(assembly.geometry.map(|mp| mp.0.len()), Some(1));
/// assert_eq!(assembly.outer_ways, vec![1, 2]);
/// ```
#[must_use]
pub fn assemble_multipolygon(members: &[RoleWay], options: &AssemblyOptions) -> Assembly {
    let mut defects = Vec::new();
    let mut outer_pieces = Vec::new();
    let mut inner_pieces = Vec::new();
    let mut unmarked_pieces = Vec::new();

    for member in members {
        let coords = dedup_consecutive(&member.coords);
        let distinct = distinct_count(&coords);
        if distinct < 2 {
            defects.push(GeometryDefect::TooFewPoints { distinct });
            continue;
        }
        let chain = Chain {
            coords,
            ways: vec![member.way_id],
        };
        match member.role {
            MemberRole::Outer => outer_pieces.push(chain),
            MemberRole::Inner => inner_pieces.push(chain),
            MemberRole::Unmarked => unmarked_pieces.push(chain),
        }
    }

    match options.empty_role {
        EmptyRolePolicy::Outer => outer_pieces.append(&mut unmarked_pieces),
        EmptyRolePolicy::Infer if inner_pieces.is_empty() => {
            outer_pieces.append(&mut unmarked_pieces);
        }
        EmptyRolePolicy::Infer => {}
        EmptyRolePolicy::Ignore => unmarked_pieces.clear(),
    }

    let tolerance = options.gap_tolerance;
    let mut outers = build_rings(outer_pieces, tolerance, &mut defects);
    let mut inners = build_rings(inner_pieces, tolerance, &mut defects);
    for ring in build_rings(unmarked_pieces, tolerance, &mut defects) {
        if outers.iter().any(|outer| outer.polygon.contains(&ring.polygon)) {
            inners.push(ring);
        } else {
            outers.push(ring);
        }
    }

    if outers.is_empty() {
        defects.push(GeometryDefect::NoOuterRing);
        return Assembly {
            defects,
            ..Assembly::default()
        };
    }

    outers.sort_by(|a, b| b.area.total_cmp(&a.area));
    inners.sort_by(|a, b| b.area.total_cmp(&a.area));

    let holes = assign_inners(&outers, inners, &mut defects);
    let parts = outers
        .into_iter()
        .zip(holes)
        .map(|(outer, assigned)| Part::from_rings(outer, assigned))
        .collect();
    let mut parts = resolve_outers(parts, &mut defects);
    parts.sort_by(|a, b| b.area().total_cmp(&a.area()));

    let mut outer_ways = Vec::new();
    let mut inner_ways = Vec::new();
    let mut polygons = Vec::with_capacity(parts.len());
    for part in parts {
        outer_ways.extend(part.outer_ways);
        inner_ways.extend(part.inner_ways);
        polygons.push(part.polygon);
    }

    Assembly {
        geometry: Some(MultiPolygon::new(polygons)),
        outer_ways,
        inner_ways,
        defects,
    }
}

fn build_rings(pieces: Vec<Chain>, tolerance: f64, defects: &mut Vec<GeometryDefect>) -> Vec<Ring> {
    let mut rings = Vec::new();
    for chain in merge_chains(pieces) {
        let built = close_chain(chain.coords, tolerance).and_then(|coords| build_ring(&coords));
        match built {
            Ok(line) => {
                let polygon = Polygon::new(line, Vec::new());
                let area = polygon.unsigned_area();
                rings.push(Ring {
                    polygon,
                    area,
                    ways: chain.ways,
                });
            }
            Err(defect) => defects.push(defect),
        }
    }
    rings
}

/// Join fragments that share endpoints into maximal chains.
fn merge_chains(pieces: Vec<Chain>) -> Vec<Chain> {
    let mut endpoints: HashMap<(u64, u64), Vec<usize>> = HashMap::new();
    for (idx, piece) in pieces.iter().enumerate() {
        if piece.is_closed() {
            continue;
        }
        endpoints.entry(coord_key(piece.first())).or_default().push(idx);
        endpoints.entry(coord_key(piece.last())).or_default().push(idx);
    }

    let mut slots: Vec<Option<Chain>> = pieces.into_iter().map(Some).collect();
    let mut merged = Vec::new();
    for idx in 0..slots.len() {
        let Some(mut chain) = slots.get_mut(idx).and_then(Option::take) else {
            continue;
        };
        while !chain.is_closed() {
            match take_touching(&mut slots, &endpoints, chain.last()) {
                Some(next) => chain.append(next),
                None => break,
            }
        }
        while !chain.is_closed() {
            match take_touching(&mut slots, &endpoints, chain.first()) {
                Some(previous) => chain.prepend(previous),
                None => break,
            }
        }
        merged.push(chain);
    }
    merged
}

fn take_touching(
    slots: &mut [Option<Chain>],
    endpoints: &HashMap<(u64, u64), Vec<usize>>,
    at: Coord<f64>,
) -> Option<Chain> {
    let candidates = endpoints.get(&coord_key(at))?;
    candidates
        .iter()
        .find_map(|&idx| slots.get_mut(idx).and_then(Option::take))
}

/// Attach each inner ring to the smallest containing outer ring, keeping
/// only holes that leave the polygon valid.
fn assign_inners(
    outers: &[Ring],
    inners: Vec<Ring>,
    defects: &mut Vec<GeometryDefect>,
) -> Vec<Vec<Ring>> {
    let mut holes: Vec<Vec<Ring>> = vec![Vec::new(); outers.len()];
    if inners.is_empty() {
        return holes;
    }

    let envelopes: Vec<_> = outers
        .iter()
        .enumerate()
        .filter_map(|(idx, outer)| {
            let rect = outer.polygon.bounding_rect()?;
            Some(GeomWithData::new(
                Rectangle::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
                idx,
            ))
        })
        .collect();
    let index = RTree::bulk_load(envelopes);

    for inner in inners {
        let Some(rect) = inner.polygon.bounding_rect() else {
            defects.push(GeometryDefect::UnassignedInner);
            continue;
        };
        let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        let owner = index
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| {
                let outer = outers.get(candidate.data)?;
                outer
                    .polygon
                    .contains(&inner.polygon)
                    .then_some((candidate.data, outer.area))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(idx, _)| idx);
        let Some(owner) = owner else {
            defects.push(GeometryDefect::UnassignedInner);
            continue;
        };
        let (Some(outer), Some(assigned)) = (outers.get(owner), holes.get_mut(owner)) else {
            continue;
        };
        if hole_keeps_polygon_valid(outer, assigned, &inner) {
            assigned.push(inner);
        } else {
            defects.push(GeometryDefect::Invalid);
        }
    }
    holes
}

/// Settle parts whose outer rings nest or overlap until every pair can
/// share a multipolygon. Merged parts are checked again against the rest.
fn resolve_outers(parts: Vec<Part>, defects: &mut Vec<GeometryDefect>) -> Vec<Part> {
    let mut pending: VecDeque<Part> = parts.into();
    let mut kept: Vec<Part> = Vec::with_capacity(pending.len());
    while let Some(candidate) = pending.pop_front() {
        let Some(position) = kept.iter().position(|part| part.conflicts_with(&candidate)) else {
            kept.push(candidate);
            continue;
        };
        let existing = kept.swap_remove(position);
        match combine(existing, candidate) {
            Ok(merged) => pending.push_front(merged),
            Err((survivor, defect)) => {
                defects.push(defect);
                kept.push(survivor);
            }
        }
    }
    kept
}

/// Combine two conflicting parts into one, or keep the larger and report
/// why the smaller was dropped.
fn combine(first: Part, second: Part) -> Result<Part, (Part, GeometryDefect)> {
    let (larger, smaller) = if first.area() >= second.area() {
        (first, second)
    } else {
        (second, first)
    };

    let shell = Polygon::new(larger.polygon.exterior().clone(), Vec::new());
    if shell.contains(&smaller.polygon) {
        return nest(larger, smaller).map_err(|larger| (larger, GeometryDefect::NestedOuter));
    }

    let mut merged = larger.polygon.union(&smaller.polygon).into_iter();
    match (merged.next(), merged.next()) {
        (Some(polygon), None) if polygon.is_valid() => {
            let mut outer_ways = larger.outer_ways;
            outer_ways.extend(smaller.outer_ways);
            let mut inner_ways = larger.inner_ways;
            inner_ways.extend(smaller.inner_ways);
            Ok(Part {
                polygon,
                outer_ways,
                inner_ways,
            })
        }
        _ => Err((larger, GeometryDefect::OverlappingOuter)),
    }
}

/// Turn `inner`'s exterior into a hole of `outer`.
fn nest(outer: Part, inner: Part) -> Result<Part, Part> {
    if !inner.polygon.interiors().is_empty() {
        return Err(outer);
    }
    let mut interiors = outer.polygon.interiors().to_vec();
    interiors.push(inner.polygon.exterior().clone());
    let polygon = Polygon::new(outer.polygon.exterior().clone(), interiors);
    if !polygon.is_valid() {
        return Err(outer);
    }
    let mut inner_ways = outer.inner_ways;
    inner_ways.extend(inner.outer_ways);
    Ok(Part {
        polygon,
        outer_ways: outer.outer_ways,
        inner_ways,
    })
}

fn hole_keeps_polygon_valid(outer: &Ring, assigned: &[Ring], candidate: &Ring) -> bool {
    let interiors: Vec<LineString<f64>> = assigned
        .iter()
        .chain(std::iter::once(candidate))
        .map(|ring| ring.polygon.exterior().clone())
        .collect();
    Polygon::new(outer.polygon.exterior().clone(), interiors).is_valid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn member(way_id: i64, role: MemberRole, points: &[(f64, f64)]) -> RoleWay {
        RoleWay {
            way_id,
            role,
            coords: points.iter().map(|&(x, y)| c(x, y)).collect(),
        }
    }

    #[fixture]
    fn options() -> AssemblyOptions {
        AssemblyOptions::default()
    }

    fn area(assembly: &Assembly) -> f64 {
        assembly
            .geometry
            .as_ref()
            .map_or(0.0, |geometry| geometry.unsigned_area())
    }

    #[rstest]
    fn merges_split_outer_ways(options: AssemblyOptions) {
        let members = vec![
            member(1, MemberRole::Outer, &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]),
            // Reversed fragment must still join.
            member(2, MemberRole::Outer, &[(0.0, 0.0), (0.0, 10.0), (10.0, 10.0)]),
        ];
        let assembly = assemble_multipolygon(&members, &options);
        assert!((area(&assembly) - 100.0).abs() < 1e-9);
        assert_eq!(assembly.outer_ways, vec![1, 2]);
        assert!(assembly.defects.is_empty());
    }

    #[rstest]
    fn single_node_outer_does_not_merge(options: AssemblyOptions) {
        let members = vec![
            member(1, MemberRole::Outer, &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]),
            member(2, MemberRole::Outer, &[(10.0, 10.0)]),
        ];
        let assembly = assemble_multipolygon(&members, &options);
        assert!(assembly.geometry.is_none());
        assert!(assembly.defects.contains(&GeometryDefect::NoOuterRing));
        assert!(
            assembly
                .defects
                .contains(&GeometryDefect::TooFewPoints { distinct: 1 })
        );
    }

    #[rstest]
    fn inner_ring_becomes_hole(options: AssemblyOptions) {
        let members = vec![
            member(
                1,
                MemberRole::Outer,
                &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)],
            ),
            member(
                2,
                MemberRole::Inner,
                &[(2.0, 2.0), (4.0, 2.0), (4.0, 4.0), (2.0, 4.0), (2.0, 2.0)],
            ),
        ];
        let assembly = assemble_multipolygon(&members, &options);
        assert!((area(&assembly) - 96.0).abs() < 1e-9);
        assert_eq!(assembly.inner_ways, vec![2]);
    }

    #[rstest]
    fn uncontained_inner_is_dropped(options: AssemblyOptions) {
        let members = vec![
            member(
                1,
                MemberRole::Outer,
                &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)],
            ),
            member(
                2,
                MemberRole::Inner,
                &[(20.0, 20.0), (24.0, 20.0), (24.0, 24.0), (20.0, 24.0), (20.0, 20.0)],
            ),
        ];
        let assembly = assemble_multipolygon(&members, &options);
        assert!((area(&assembly) - 100.0).abs() < 1e-9);
        assert!(assembly.defects.contains(&GeometryDefect::UnassignedInner));
    }

    #[rstest]
    fn open_member_does_not_poison_relation(options: AssemblyOptions) {
        let members = vec![
            member(
                1,
                MemberRole::Outer,
                &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)],
            ),
            member(2, MemberRole::Outer, &[(20.0, 0.0), (30.0, 0.0), (30.0, 10.0)]),
        ];
        let assembly = assemble_multipolygon(&members, &options);
        assert_eq!(assembly.geometry.map(|mp| mp.0.len()), Some(1));
        assert!(
            assembly
                .defects
                .iter()
                .any(|defect| matches!(defect, GeometryDefect::NotClosed { .. }))
        );
    }

    #[rstest]
    fn gap_within_tolerance_is_closed(options: AssemblyOptions) {
        let members = vec![
            member(1, MemberRole::Outer, &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]),
            member(2, MemberRole::Outer, &[(10.0, 10.0), (0.0, 10.0), (0.2, 0.1)]),
        ];
        let assembly = assemble_multipolygon(&members, &options);
        let geometry = assembly.geometry.expect("gap closed");
        assert!(geometry.is_valid());
    }

    #[rstest]
    #[case(EmptyRolePolicy::Infer, vec![1], vec![3, 2])]
    #[case(EmptyRolePolicy::Outer, vec![1], vec![3, 2])]
    #[case(EmptyRolePolicy::Ignore, vec![1], vec![3])]
    fn unmarked_ring_follows_policy(
        #[case] empty_role: EmptyRolePolicy,
        #[case] outer_ways: Vec<i64>,
        #[case] inner_ways: Vec<i64>,
    ) {
        let members = vec![
            member(
                1,
                MemberRole::Outer,
                &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)],
            ),
            member(
                2,
                MemberRole::Unmarked,
                &[(2.0, 2.0), (4.0, 2.0), (4.0, 4.0), (2.0, 4.0), (2.0, 2.0)],
            ),
            member(
                3,
                MemberRole::Inner,
                &[(6.0, 6.0), (8.0, 6.0), (8.0, 8.0), (6.0, 8.0), (6.0, 6.0)],
            ),
        ];
        let options = AssemblyOptions {
            empty_role,
            ..AssemblyOptions::default()
        };
        let assembly = assemble_multipolygon(&members, &options);
        assert_eq!(assembly.outer_ways, outer_ways);
        assert_eq!(assembly.inner_ways, inner_ways);
    }

    #[rstest]
    fn overlapping_inners_keep_first_only(options: AssemblyOptions) {
        let members = vec![
            member(
                1,
                MemberRole::Outer,
                &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)],
            ),
            member(
                2,
                MemberRole::Inner,
                &[(2.0, 2.0), (6.0, 2.0), (6.0, 6.0), (2.0, 6.0), (2.0, 2.0)],
            ),
            member(
                3,
                MemberRole::Inner,
                &[(4.0, 4.0), (7.0, 4.0), (7.0, 7.0), (4.0, 7.0), (4.0, 4.0)],
            ),
        ];
        let assembly = assemble_multipolygon(&members, &options);
        assert_eq!(assembly.inner_ways, vec![2]);
        assert!(assembly.defects.contains(&GeometryDefect::Invalid));
        assert!(assembly.geometry.expect("outer survives").is_valid());
    }

    fn square(way_id: i64, role: MemberRole, min: f64, max: f64) -> RoleWay {
        member(
            way_id,
            role,
            &[(min, min), (max, min), (max, max), (min, max), (min, min)],
        )
    }

    #[rstest]
    fn overlapping_outers_are_merged(options: AssemblyOptions) {
        let members = vec![
            square(1, MemberRole::Outer, 0.0, 10.0),
            square(2, MemberRole::Outer, 5.0, 15.0),
        ];
        let assembly = assemble_multipolygon(&members, &options);
        let geometry = assembly.geometry.clone().expect("merged outer");
        assert!(geometry.is_valid());
        assert_eq!(geometry.0.len(), 1);
        assert!((area(&assembly) - 175.0).abs() < 1e-6);
        assert_eq!(assembly.outer_ways, vec![1, 2]);
        assert!(assembly.defects.is_empty());
    }

    #[rstest]
    fn outers_sharing_an_edge_are_merged(options: AssemblyOptions) {
        let members = vec![
            member(
                1,
                MemberRole::Outer,
                &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)],
            ),
            member(
                2,
                MemberRole::Outer,
                &[(10.0, 0.0), (20.0, 0.0), (20.0, 10.0), (10.0, 10.0), (10.0, 0.0)],
            ),
        ];
        let assembly = assemble_multipolygon(&members, &options);
        let geometry = assembly.geometry.clone().expect("merged outer");
        assert!(geometry.is_valid());
        assert_eq!(geometry.0.len(), 1);
        assert!((area(&assembly) - 200.0).abs() < 1e-6);
    }

    #[rstest]
    fn nested_outer_becomes_a_hole(options: AssemblyOptions) {
        let members = vec![
            square(1, MemberRole::Outer, 0.0, 10.0),
            square(2, MemberRole::Outer, 2.0, 4.0),
        ];
        let assembly = assemble_multipolygon(&members, &options);
        let geometry = assembly.geometry.clone().expect("outer survives");
        assert!(geometry.is_valid());
        assert!((area(&assembly) - 96.0).abs() < 1e-9);
        assert_eq!(assembly.outer_ways, vec![1]);
        assert_eq!(assembly.inner_ways, vec![2]);
        assert!(assembly.defects.is_empty());
    }

    #[rstest]
    fn island_inside_a_hole_stays_separate(options: AssemblyOptions) {
        let members = vec![
            square(1, MemberRole::Outer, 0.0, 10.0),
            square(2, MemberRole::Inner, 2.0, 8.0),
            square(3, MemberRole::Outer, 4.0, 6.0),
        ];
        let assembly = assemble_multipolygon(&members, &options);
        let geometry = assembly.geometry.clone().expect("both outers survive");
        assert!(geometry.is_valid());
        assert_eq!(geometry.0.len(), 2);
        assert!((area(&assembly) - 68.0).abs() < 1e-9);
        assert_eq!(assembly.outer_ways, vec![1, 3]);
        assert!(assembly.defects.is_empty());
    }

    #[rstest]
    fn nested_outer_crossing_a_hole_is_dropped(options: AssemblyOptions) {
        let members = vec![
            square(1, MemberRole::Outer, 0.0, 10.0),
            square(2, MemberRole::Inner, 2.0, 6.0),
            square(3, MemberRole::Outer, 4.0, 8.0),
        ];
        let assembly = assemble_multipolygon(&members, &options);
        let geometry = assembly.geometry.clone().expect("largest outer survives");
        assert!(geometry.is_valid());
        assert!((area(&assembly) - 84.0).abs() < 1e-9);
        assert_eq!(assembly.outer_ways, vec![1]);
        assert_eq!(assembly.inner_ways, vec![2]);
        assert!(assembly.defects.contains(&GeometryDefect::NestedOuter));
    }

    #[rstest]
    fn unknown_roles_are_ignored() {
        assert_eq!(MemberRole::parse("label"), None);
        assert_eq!(MemberRole::parse(" outer "), Some(MemberRole::Outer));
    }
}
