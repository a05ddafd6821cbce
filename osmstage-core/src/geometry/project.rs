use std::f64::consts::PI;

use geo::Coord;
use serde::{Deserialize, Serialize};

const EARTH_RADIUS: f64 = 6_378_137.0;
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Output spatial reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Projection {
    /// EPSG:3857, metres.
    #[default]
    #[serde(rename = "webmercator", alias = "EPSG:3857")]
    WebMercator,
    /// EPSG:4326, degrees as decoded.
    #[serde(rename = "wgs84", alias = "EPSG:4326")]
    Wgs84,
}

impl Projection {
    /// Project a WGS84 coordinate (`x = lon`, `y = lat`).
    ///
    /// # Examples
    /// ```
    /// use geo::Coord;
    /// use osmstage_core::geometry::Projection;
    ///
    /// let origin = Projection::WebMercator.project(Coord { x: 0.0, y: 0.0 });
    /// assert!(origin.x.abs() < 1e-9 && origin.y.abs() < 1e-9);
    /// ```
    #[must_use]
    pub fn project(self, coord: Coord<f64>) -> Coord<f64> {
        match self {
            Self::Wgs84 => coord,
            Self::WebMercator => {
                let lat = coord.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
                Coord {
                    x: coord.x.to_radians() * EARTH_RADIUS,
                    y: (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * EARTH_RADIUS,
                }
            }
        }
    }

    /// EPSG code of the projection.
    #[must_use]
    pub const fn srid(self) -> u32 {
        match self {
            Self::WebMercator => 3857,
            Self::Wgs84 => 4326,
        }
    }
}
