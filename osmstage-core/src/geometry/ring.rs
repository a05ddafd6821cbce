//! Ring closing and validation.

use geo::{Area, Coord, Distance, Euclidean, LineString, Polygon, Validation};

use super::{GeometryDefect, dedup_consecutive, distinct_count};

/// Close a coordinate chain into a ring.
///
/// A chain whose endpoints already coincide is returned as-is. When the gap
/// between the endpoints is within `tolerance` the final coordinate is
/// snapped onto the first. Wider gaps leave the chain open.
pub fn close_chain(
    mut coords: Vec<Coord<f64>>,
    tolerance: f64,
) -> Result<Vec<Coord<f64>>, GeometryDefect> {
    let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) else {
        return Err(GeometryDefect::TooFewPoints { distinct: 0 });
    };
    if first == last {
        return Ok(coords);
    }
    let gap = Euclidean.distance(first, last);
    if gap > tolerance {
        return Err(GeometryDefect::NotClosed { gap });
    }
    if coords.len() > 2 {
        // Snap rather than append so the ring gains no sliver segment.
        if let Some(tail) = coords.last_mut() {
            *tail = first;
        }
    } else {
        coords.push(first);
    }
    Ok(coords)
}

/// Validate a closed coordinate sequence as a polygon ring.
///
/// Consecutive duplicates are collapsed first. The result needs four
/// coordinates, three distinct ones, a non-zero area and no
/// self-intersection.
pub fn build_ring(coords: &[Coord<f64>]) -> Result<LineString<f64>, GeometryDefect> {
    let deduped = dedup_consecutive(coords);
    let distinct = distinct_count(&deduped);
    if deduped.len() < 4 || distinct < 3 || deduped.first() != deduped.last() {
        return Err(GeometryDefect::DegenerateRing {
            points: deduped.len(),
            distinct,
        });
    }
    let ring = LineString::new(deduped);
    let polygon = Polygon::new(ring, Vec::new());
    if polygon.unsigned_area() <= 0.0 {
        return Err(GeometryDefect::ZeroArea);
    }
    if !polygon.is_valid() {
        return Err(GeometryDefect::Invalid);
    }
    let (exterior, _) = polygon.into_inner();
    Ok(exterior)
}

/// Build a polygon from a single way.
///
/// `closed_by_id` reports whether the way starts and ends on the same node.
/// Ways that are not closed by id may still close within `tolerance`.
pub fn build_way_polygon(
    coords: &[Coord<f64>],
    closed_by_id: bool,
    tolerance: f64,
) -> Result<Polygon<f64>, GeometryDefect> {
    let deduped = dedup_consecutive(coords);
    let closed = if closed_by_id {
        deduped
    } else {
        close_chain(deduped, tolerance)?
    };
    let ring = build_ring(&closed)?;
    Ok(Polygon::new(ring, Vec::new()))
}
