use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine distance
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres per degree, applied to both axes.
/// Longitude compression is ignored: valid inside the mid-latitude operating
/// envelope and for radii of a few kilometres, not near the poles.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Operating envelope. Records outside it are malformed.
pub const COUNTRY_BOUNDS: BoundingBox = BoundingBox {
    min_lat: 20.0,
    max_lat: 27.0,
    min_lon: 118.0,
    max_lon: 127.0,
};

/// Country-wide view
pub const OVERVIEW_CENTER: GeoPoint = GeoPoint { lat: 23.7, lon: 120.95 };
pub const OVERVIEW_ZOOM: u8 = 8;
/// Street-level view around a single venue
pub const DETAIL_ZOOM: u8 = 16;

/// A WGS84 coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Anything with a single geographic position
pub trait Located {
    fn position(&self) -> GeoPoint;
}

impl Located for GeoPoint {
    #[inline(always)]
    fn position(&self) -> GeoPoint {
        *self
    }
}

impl<T: Located + ?Sized> Located for &T {
    #[inline(always)]
    fn position(&self) -> GeoPoint {
        (**self).position()
    }
}

/// Axis-aligned latitude/longitude rectangle (closed on every edge)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Closed-interval membership on both axes
    #[inline(always)]
    pub fn contains(&self, point: GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lon >= self.min_lon
            && point.lon <= self.max_lon
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) * 0.5,
            (self.min_lon + self.max_lon) * 0.5,
        )
    }

    /// Smallest box covering both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lon: self.min_lon.min(other.min_lon),
            max_lon: self.max_lon.max(other.max_lon),
        }
    }
}

/// Square box of half-width `radius_km` around `center`
pub fn bbox(center: GeoPoint, radius_km: f64) -> BoundingBox {
    let offset = radius_km.abs() / KM_PER_DEGREE;
    BoundingBox {
        min_lat: center.lat - offset,
        max_lat: center.lat + offset,
        min_lon: center.lon - offset,
        max_lon: center.lon + offset,
    }
}

/// Great-circle distance in kilometres on a spherical Earth
#[inline(always)]
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Round to `precision` decimal digits, half away from zero
#[inline(always)]
pub fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (value * scale).round() / scale
}

/// Integer grid key for `value` at `precision` digits (exact, hashable)
#[inline(always)]
pub fn bucket_key(value: f64, precision: u32) -> i64 {
    let scale = 10f64.powi(precision as i32);
    (value * scale).round() as i64
}

/// Inverse of [`bucket_key`]
#[inline(always)]
pub fn bucket_value(key: i64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    key as f64 / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_bbox_uses_uniform_degrees_per_km() {
        let b = bbox(GeoPoint::new(25.0, 121.5), 1.11);
        assert!((b.max_lat - 25.01).abs() < 1e-9);
        assert!((b.min_lon - 121.49).abs() < 1e-9);
    }

    #[rstest]
    #[case(25.0, 121.5, true)]
    #[case(24.99, 121.49, true)] // corner is inside
    #[case(25.01, 121.51, true)]
    #[case(25.0101, 121.5, false)]
    #[case(25.0, 121.4899, false)]
    fn test_contains_is_closed(#[case] lat: f64, #[case] lon: f64, #[case] expected: bool) {
        let b = BoundingBox {
            min_lat: 24.99,
            max_lat: 25.01,
            min_lon: 121.49,
            max_lon: 121.51,
        };
        assert_eq!(b.contains(GeoPoint::new(lat, lon)), expected);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Taipei 101 to Taipei Main Station is roughly 5 km
        let d = haversine_km(GeoPoint::new(25.0340, 121.5645), GeoPoint::new(25.0478, 121.5170));
        assert!((d - 5.0).abs() < 0.3, "got {d}");
        assert_eq!(haversine_km(GeoPoint::new(1.0, 2.0), GeoPoint::new(1.0, 2.0)), 0.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(25.0881, 2), 25.09);
        assert_eq!(round_to(121.524, 2), 121.52);
        assert_eq!(bucket_key(121.524, 2), 12152);
        assert!((bucket_value(12152, 2) - 121.52).abs() < 1e-9);
    }
}
