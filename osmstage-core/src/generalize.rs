//! Validity-preserving simplification for generalized tables.
//!
//! Every level is simplified from the full-detail geometry with its own
//! tolerance, never from a coarser level. Polygonal geometries are checked
//! as a whole: when the simplified result is invalid, or its area drifts
//! further than the level allows, the tolerance is halved and the attempt
//! repeated; if no attempt succeeds the full-detail geometry is kept. Lines
//! follow the same retry scheme, keyed on their change in length.

use geo::{Area, Euclidean, Geometry, Length, LineString, Simplify, Validation};

use crate::geometry::distinct_count;
use crate::mapping::TableSpec;

const MAX_ATTEMPTS: usize = 4;

/// Relative area change allowed when a level does not set its own bound.
pub const DEFAULT_MAX_AREA_DRIFT: f64 = 0.02;

/// Tolerances for one generalized level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    /// Douglas-Peucker tolerance in projected units.
    pub tolerance: f64,
    /// Largest relative change in polygon area, as a fraction of the
    /// full-detail area.
    pub max_area_drift: f64,
}

impl Level {
    /// Level with the default area bound.
    #[must_use]
    pub const fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            max_area_drift: DEFAULT_MAX_AREA_DRIFT,
        }
    }
}

/// Simplifies geometries for a fixed list of levels.
///
/// # Examples
/// ```
/// use geo::{Geometry, LineString};
/// use osmstage_core::Generalizer;
///
/// let line = LineString::from(vec![(0.0, 0.0), (5.0, 0.1), (10.0, 0.0)]);
/// let generalizer = Generalizer::new(vec![1.0]);
/// let simplified = generalizer.generalize(&Geometry::LineString(line.clone()), 0);
/// // Dropping the middle point would shorten the line by less than the tolerance.
/// assert!(matches!(simplified, Some(Geometry::LineString(l)) if l.0.len() == 2));
/// assert!(generalizer.generalize(&Geometry::LineString(line), 1).is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Generalizer {
    levels: Vec<Level>,
}

impl Generalizer {
    /// Create a generalizer with one tolerance per level and the default
    /// area bound.
    #[must_use]
    pub fn new(tolerances: Vec<f64>) -> Self {
        Self::from_levels(tolerances.into_iter().map(Level::new).collect())
    }

    /// Create a generalizer from fully specified levels.
    #[must_use]
    pub const fn from_levels(levels: Vec<Level>) -> Self {
        Self { levels }
    }

    /// Generalizer for the variants of `table`.
    #[must_use]
    pub fn for_table(table: &TableSpec) -> Self {
        Self::from_levels(
            table
                .generalized
                .iter()
                .map(|variant| Level {
                    tolerance: variant.tolerance,
                    max_area_drift: variant.max_area_drift,
                })
                .collect(),
        )
    }

    /// Number of configured levels.
    #[must_use]
    pub fn levels(&self) -> usize {
        self.levels.len()
    }

    /// Simplify `geometry` for `level`. Returns `None` for an unknown level.
    #[must_use]
    pub fn generalize(&self, geometry: &Geometry<f64>, level: u8) -> Option<Geometry<f64>> {
        let level = self.levels.get(usize::from(level))?;
        Some(simplify_geometry(geometry, *level))
    }
}

fn simplify_geometry(geometry: &Geometry<f64>, level: Level) -> Geometry<f64> {
    match geometry {
        Geometry::LineString(line) => Geometry::LineString(simplify_line(line, level.tolerance)),
        Geometry::Polygon(polygon) => Geometry::Polygon(simplify_areal(polygon, level)),
        Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(simplify_areal(polygons, level)),
        other => other.clone(),
    }
}

fn simplify_line(line: &LineString<f64>, tolerance: f64) -> LineString<f64> {
    let original_length = Euclidean.length(line);
    let mut attempt = tolerance;
    for _ in 0..MAX_ATTEMPTS {
        let simplified = line.simplify(attempt);
        let kept_shape = distinct_count(&simplified.0) >= 2;
        let drift = (original_length - Euclidean.length(&simplified)).abs();
        if kept_shape && drift <= tolerance {
            return simplified;
        }
        attempt /= 2.0;
    }
    line.clone()
}

/// Simplify a polygon or multipolygon, validating the whole result.
fn simplify_areal<G>(geometry: &G, level: Level) -> G
where
    G: Simplify<f64> + Area<f64> + Validation + Clone,
{
    let original_area = geometry.unsigned_area();
    let allowed = original_area * level.max_area_drift;
    let mut attempt = level.tolerance;
    for _ in 0..MAX_ATTEMPTS {
        let simplified = geometry.simplify(attempt);
        let drift = (simplified.unsigned_area() - original_area).abs();
        if drift <= allowed && simplified.is_valid() {
            return simplified;
        }
        attempt /= 2.0;
    }
    geometry.clone()
}
