//! Great-circle geometry on WGS84 coordinates.
//!
//! All proximity checks in the crate go through [`haversine_m`]. Segment
//! projection uses an equirectangular approximation, which is accurate for
//! the short segments between two maneuver anchors.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Meters per degree of latitude.
const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in meters.
    #[inline]
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_m(self, other)
    }

    /// Check that both components are finite and inside WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Haversine distance between two points in meters.
pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Initial bearing from `a` to `b` in degrees, [0, 360).
pub fn bearing_deg(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Distance in meters from `p` to the closest point of segment `a`-`b`.
pub fn distance_to_segment_m(p: &GeoPoint, a: &GeoPoint, b: &GeoPoint) -> f64 {
    let cos_lat = ((a.latitude + b.latitude) / 2.0).to_radians().cos();

    let dx = (b.longitude - a.longitude) * cos_lat;
    let dy = b.latitude - a.latitude;
    let px = (p.longitude - a.longitude) * cos_lat;
    let py = p.latitude - a.latitude;

    let seg_len_sq = dx * dx + dy * dy;
    if seg_len_sq < 1e-20 {
        return haversine_m(p, a);
    }

    let t = ((px * dx + py * dy) / seg_len_sq).clamp(0.0, 1.0);
    let projected = GeoPoint::new(
        a.latitude + t * (b.latitude - a.latitude),
        a.longitude + t * (b.longitude - a.longitude),
    );
    haversine_m(p, &projected)
}

/// Distance in meters from `p` to the closest point of a polyline.
///
/// Returns `None` for an empty polyline; a single point degenerates to a
/// point distance.
pub fn distance_to_polyline_m(p: &GeoPoint, polyline: &[GeoPoint]) -> Option<f64> {
    match polyline {
        [] => None,
        [single] => Some(haversine_m(p, single)),
        _ => polyline
            .windows(2)
            .map(|w| distance_to_segment_m(p, &w[0], &w[1]))
            .min_by(|a, b| a.total_cmp(b)),
    }
}

/// Axis-aligned latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: GeoPoint,
    pub max: GeoPoint,
}

impl BoundingBox {
    /// Smallest box containing all points, or `None` if there are none.
    pub fn around<'a>(points: impl IntoIterator<Item = &'a GeoPoint>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bbox = Self {
            min: first,
            max: first,
        };
        for p in iter {
            bbox.min.latitude = bbox.min.latitude.min(p.latitude);
            bbox.min.longitude = bbox.min.longitude.min(p.longitude);
            bbox.max.latitude = bbox.max.latitude.max(p.latitude);
            bbox.max.longitude = bbox.max.longitude.max(p.longitude);
        }
        Some(bbox)
    }

    /// Grow the box by `meters` on every side.
    pub fn padded(&self, meters: f64) -> Self {
        let dlat = meters / METERS_PER_DEGREE;
        let mid_lat = ((self.min.latitude + self.max.latitude) / 2.0).to_radians();
        let dlon = meters / (METERS_PER_DEGREE * mid_lat.cos().max(1e-6));
        Self {
            min: GeoPoint::new(
                (self.min.latitude - dlat).max(-90.0),
                (self.min.longitude - dlon).max(-180.0),
            ),
            max: GeoPoint::new(
                (self.max.latitude + dlat).min(90.0),
                (self.max.longitude + dlon).min(180.0),
            ),
        }
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        (self.min.latitude..=self.max.latitude).contains(&p.latitude)
            && (self.min.longitude..=self.max.longitude).contains(&p.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_haversine_same_point() {
        let p = GeoPoint::new(48.2, 16.37);
        assert_relative_eq!(haversine_m(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Vienna to Bratislava is roughly 55 km.
        let vienna = GeoPoint::new(48.2082, 16.3738);
        let bratislava = GeoPoint::new(48.1486, 17.1077);
        let dist = haversine_m(&vienna, &bratislava);
        assert!((dist - 55_000.0).abs() < 2_000.0, "got {dist}");
    }

    #[test]
    fn test_haversine_equator_millidegree() {
        // 0.001° of longitude at the equator is ~111.2 m.
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 0.001);
        assert_relative_eq!(haversine_m(&a, &b), 111.195, epsilon = 0.01);
    }

    #[test]
    fn test_bearing_cardinal() {
        let origin = GeoPoint::new(0.0, 0.0);
        assert_relative_eq!(bearing_deg(&origin, &GeoPoint::new(1.0, 0.0)), 0.0, epsilon = 1e-9);
        assert_relative_eq!(bearing_deg(&origin, &GeoPoint::new(0.0, 1.0)), 90.0, epsilon = 1e-9);
        assert_relative_eq!(bearing_deg(&origin, &GeoPoint::new(-1.0, 0.0)), 180.0, epsilon = 1e-9);
        assert_relative_eq!(bearing_deg(&origin, &GeoPoint::new(0.0, -1.0)), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_segment_distance_perpendicular() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 0.01);
        // 0.001° north of the segment midpoint.
        let p = GeoPoint::new(0.001, 0.005);
        assert_relative_eq!(distance_to_segment_m(&p, &a, &b), 111.195, epsilon = 0.05);
    }

    #[test]
    fn test_segment_distance_clamps_to_endpoint() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 0.001);
        let p = GeoPoint::new(0.0, 0.002);
        assert_relative_eq!(
            distance_to_segment_m(&p, &a, &b),
            haversine_m(&p, &b),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_polyline_distance() {
        assert!(distance_to_polyline_m(&GeoPoint::default(), &[]).is_none());

        let line = [
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.01),
            GeoPoint::new(0.01, 0.01),
        ];
        let on_second_leg = GeoPoint::new(0.005, 0.01);
        let d = distance_to_polyline_m(&on_second_leg, &line).unwrap();
        assert!(d < 0.01, "got {d}");
    }

    #[test]
    fn test_bounding_box_padding() {
        let pts = [GeoPoint::new(0.0, 0.0), GeoPoint::new(0.01, 0.02)];
        let bbox = BoundingBox::around(&pts).unwrap();
        assert!(bbox.contains(&GeoPoint::new(0.005, 0.01)));
        assert!(!bbox.contains(&GeoPoint::new(0.011, 0.01)));

        let padded = bbox.padded(200.0);
        assert!(padded.contains(&GeoPoint::new(0.011, 0.01)));
        let empty: [GeoPoint; 0] = [];
        assert!(BoundingBox::around(&empty).is_none());
    }

    #[test]
    fn test_point_validity() {
        assert!(GeoPoint::new(45.0, 120.0).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::NAN).is_valid());
    }
}
