//! Coordinate normalization and great-circle distance.
//!
//! Model inputs and outputs live in a per-channel min/max normalized space.
//! [`ChannelBounds`] maps between that space and physical degrees, and
//! [`haversine_distance`] measures the error between two physical positions.

use ::geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShipTrajError};

/// Mean Earth radius in meters (IUGG), the radius [`haversine_distance`]
/// measures on.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A latitude/longitude position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl GeoPoint {
    /// Create a point from latitude and longitude in degrees.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Fixed min/max bounds of one coordinate channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelBounds {
    /// Physical value mapped to 0.0.
    pub min: f64,
    /// Physical value mapped to 1.0.
    pub max: f64,
}

impl ChannelBounds {
    /// Create bounds for one channel.
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Width of the physical interval.
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Map a physical value into `[0, 1]` (for values inside the bounds).
    pub fn normalize(&self, physical: f64) -> f64 {
        (physical - self.min) / self.span()
    }

    /// Map a normalized value back to physical units.
    pub fn denormalize(&self, normalized: f64) -> f64 {
        normalized * self.span() + self.min
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) {
            return Err(ShipTrajError::Config(format!(
                "bounds.{name} must be finite"
            )));
        }
        if self.max <= self.min {
            return Err(ShipTrajError::Config(format!(
                "bounds.{name}.max ({}) must be greater than min ({})",
                self.max, self.min
            )));
        }
        Ok(())
    }
}

/// Normalization bounds for the latitude and longitude channels.
///
/// # Example
///
/// ```rust
/// use shiptraj_rs::geo::{CoordinateBounds, GeoPoint};
///
/// let bounds = CoordinateBounds::default();
/// let p = bounds.denormalize(0.0, 1.0);
/// assert_eq!(p, GeoPoint::new(55.5, 13.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateBounds {
    /// Latitude bounds (channel 0).
    pub lat: ChannelBounds,
    /// Longitude bounds (channel 1).
    pub lon: ChannelBounds,
}

impl Default for CoordinateBounds {
    /// Bounds of the Danish AIS region the baseline was trained on.
    fn default() -> Self {
        Self {
            lat: ChannelBounds::new(55.5, 58.0),
            lon: ChannelBounds::new(10.3, 13.0),
        }
    }
}

impl CoordinateBounds {
    /// Denormalize a `(lat, lon)` pair from model space into degrees.
    pub fn denormalize(&self, lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(self.lat.denormalize(lat), self.lon.denormalize(lon))
    }

    /// Normalize a physical point into model space, returning `(lat, lon)`.
    pub fn normalize(&self, point: GeoPoint) -> (f64, f64) {
        (self.lat.normalize(point.lat), self.lon.normalize(point.lon))
    }

    /// Check that both channels have a positive, finite span.
    pub fn validate(&self) -> Result<()> {
        self.lat.validate("lat")?;
        self.lon.validate("lon")
    }
}

/// Great-circle distance in meters between two points on a spherical Earth.
///
/// # Example
///
/// ```rust
/// use shiptraj_rs::geo::{haversine_distance, GeoPoint};
///
/// let a = GeoPoint::new(56.0, 12.0);
/// assert_eq!(haversine_distance(a, a), 0.0);
/// ```
pub fn haversine_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    Haversine::distance(Point::new(a.lon, a.lat), Point::new(b.lon, b.lat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bounds() {
        let bounds = CoordinateBounds::default();
        assert_eq!(bounds.lat, ChannelBounds::new(55.5, 58.0));
        assert_eq!(bounds.lon, ChannelBounds::new(10.3, 13.0));
        assert!(bounds.validate().is_ok());
    }

    #[test]
    fn test_denormalize_normalize_roundtrip() {
        let bounds = CoordinateBounds::default();
        for i in 0..=20 {
            let t = f64::from(i) / 20.0;
            let lat = bounds.lat.min + t * bounds.lat.span();
            let lon = bounds.lon.min + t * bounds.lon.span();
            let (nlat, nlon) = bounds.normalize(GeoPoint::new(lat, lon));
            let back = bounds.denormalize(nlat, nlon);
            assert!((back.lat - lat).abs() < 1e-12);
            assert!((back.lon - lon).abs() < 1e-12);
        }
    }

    #[test]
    fn test_normalize_endpoints() {
        let lat = ChannelBounds::new(55.5, 58.0);
        assert_eq!(lat.normalize(55.5), 0.0);
        assert_eq!(lat.normalize(58.0), 1.0);
        assert_eq!(lat.denormalize(0.5), 56.75);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let mut bounds = CoordinateBounds::default();
        bounds.lon = ChannelBounds::new(13.0, 10.3);
        assert!(bounds.validate().is_err());

        bounds.lon = ChannelBounds::new(10.0, 10.0);
        assert!(bounds.validate().is_err());

        bounds.lon = ChannelBounds::new(f64::NAN, 10.0);
        assert!(bounds.validate().is_err());
    }

    #[test]
    fn test_haversine_zero_for_identical_points() {
        let p = GeoPoint::new(57.3, 11.1);
        assert_eq!(haversine_distance(p, p), 0.0);
    }

    #[test]
    fn test_haversine_symmetric() {
        let pairs = [
            (GeoPoint::new(56.0, 12.0), GeoPoint::new(56.1, 12.1)),
            (GeoPoint::new(55.5, 10.3), GeoPoint::new(58.0, 13.0)),
            (GeoPoint::new(-33.9, 151.2), GeoPoint::new(51.5, -0.1)),
        ];
        for (a, b) in pairs {
            let ab = haversine_distance(a, b);
            let ba = haversine_distance(b, a);
            assert!((ab - ba).abs() < 1e-6, "{ab} != {ba}");
        }
    }

    #[test]
    fn test_haversine_reference_pair() {
        // 0.1 degree steps in both axes around 56N
        let d = haversine_distance(GeoPoint::new(56.0, 12.0), GeoPoint::new(56.1, 12.1));
        let expected = 12_736.0;
        assert!(
            (d - expected).abs() / expected < 0.01,
            "distance {d} m not within 1% of {expected} m"
        );
    }

    #[test]
    fn test_haversine_one_degree_meridian() {
        // one degree of latitude is R * pi / 180
        let d = haversine_distance(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
        let expected = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        assert!((d - expected).abs() < 1e-6);
    }

    #[test]
    fn test_haversine_antipodal() {
        let d = haversine_distance(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 180.0));
        assert!((d - EARTH_RADIUS_M * std::f64::consts::PI).abs() < 1e-3);
    }
}
