//! Planar separation and signed offsets between two points.
//!
//! Cartesian input uses plain coordinate differences. Geographic input
//! (longitude, latitude in degrees) uses a flat-Earth approximation in
//! kilometres: longitude differences are shortened by the cosine of the mean
//! latitude and both axes are scaled by the length of one degree of arc.

use rkyv::{Archive, Deserialize, Serialize};

/// Mean Earth radius in km.
pub const EARTH_RADIUS_KM: f64 = 6371.0087714;

/// Kilometres per degree of arc on the mean sphere.
pub const KM_PER_DEGREE: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

/// How distances between locations are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Archive, Serialize, Deserialize)]
pub enum DistanceModel {
    /// Euclidean distance in user units.
    #[default]
    Cartesian,
    /// Longitude/latitude in degrees, flat-Earth distances in km.
    Geographic,
}

impl DistanceModel {
    /// Returns `true` for longitude/latitude input.
    pub fn is_geographic(&self) -> bool {
        matches!(self, DistanceModel::Geographic)
    }

    /// Separation between `p0` and `p1` (always ≥ 0).
    #[inline]
    pub fn radius(&self, p0: [f64; 2], p1: [f64; 2]) -> f64 {
        let (dx, dy) = self.offset(p0, p1);
        dx.hypot(dy)
    }

    /// Signed offset `(dx, dy)` of `p1` relative to `p0`.
    ///
    /// Antisymmetric: `offset(a, b) == -offset(b, a)`. Geographic longitude
    /// differences take the shortest way around the globe.
    #[inline]
    pub fn offset(&self, p0: [f64; 2], p1: [f64; 2]) -> (f64, f64) {
        match self {
            DistanceModel::Cartesian => (p1[0] - p0[0], p1[1] - p0[1]),
            DistanceModel::Geographic => {
                let dlon = delta_lon(p0[0], p1[0]);
                let mean_lat = 0.5 * (p0[1] + p1[1]);
                (
                    dlon * mean_lat.to_radians().cos() * KM_PER_DEGREE,
                    (p1[1] - p0[1]) * KM_PER_DEGREE,
                )
            }
        }
    }
}

/// `lon` shifted by whole turns to lie within 180° of `reference`.
///
/// Every spelling of one meridian (`180`, `-180`, `540`) maps to the same
/// value, so quantities that are linear in longitude stay continuous across
/// the dateline when taken about a fixed reference.
#[inline]
pub fn unwrap_longitude(reference: f64, lon: f64) -> f64 {
    reference + delta_lon(reference, lon)
}

/// Signed longitude difference `lon1 - lon0` folded into [-180, 180].
#[inline]
fn delta_lon(lon0: f64, lon1: f64) -> f64 {
    // `%` truncates toward zero, so the fold is symmetric in its arguments
    let mut d = (lon1 - lon0) % 360.0;
    if d > 180.0 {
        d -= 360.0;
    } else if d < -180.0 {
        d += 360.0;
    }
    d
}
