use geo::{Coord, LineString};

use super::{GeometryDefect, dedup_consecutive, distinct_count};

/// Build a line from projected way coordinates in member order.
///
/// Consecutive duplicates are collapsed. Lines may self-intersect; they only
/// need two distinct coordinates.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osmstage_core::geometry::{GeometryDefect, build_line};
///
/// let point = Coord { x: 1.0, y: 1.0 };
/// assert_eq!(
///     build_line(&[point, point]),
///     Err(GeometryDefect::TooFewPoints { distinct: 1 })
/// );
/// ```
pub fn build_line(coords: &[Coord<f64>]) -> Result<LineString<f64>, GeometryDefect> {
    let deduped = dedup_consecutive(coords);
    let distinct = distinct_count(&deduped);
    if distinct < 2 {
        return Err(GeometryDefect::TooFewPoints { distinct });
    }
    Ok(LineString::new(deduped))
}
