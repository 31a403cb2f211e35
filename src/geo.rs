//! Geodesy helpers shared by the CPU kernels and mirrored in WGSL.
//!
//! Positions are `(longitude, latitude)` in degrees. Wind velocities are in
//! metres per second and are converted to degrees per integration step with
//! the WGS84 length-of-a-degree series.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// WGS84 semi-major axis in metres.
pub const WGS84_SEMI_MAJOR_AXIS: f32 = 6_378_137.0;
/// WGS84 first eccentricity squared.
pub const WGS84_ECCENTRICITY_SQUARED: f32 = 0.006_694_38;
/// WGS84 maximum radius, used as the pixel-size reference sphere.
pub const WGS84_MAXIMUM_RADIUS: f32 = WGS84_SEMI_MAJOR_AXIS;
/// Latitude limit for metric-to-degree conversion. A degree of longitude
/// shrinks to zero length at the poles.
pub const CONVERSION_LATITUDE_LIMIT: f32 = 89.0;

/// A closed `[min, max]` interval.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f32,
    pub max: f32,
}

impl Range {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// `max - min`.
    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    /// Inclusive containment test.
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// `min + t * span`.
    pub fn lerp(&self, t: f32) -> f32 {
        self.min + t * self.span()
    }

    pub fn center(&self) -> f32 {
        0.5 * (self.min + self.max)
    }

    pub fn is_ordered(&self) -> bool {
        self.min < self.max
    }

    pub fn to_vec2(self) -> Vec2 {
        Vec2::new(self.min, self.max)
    }
}

/// A geographic rectangle. Degrees unless stated otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub west: f32,
    pub south: f32,
    pub east: f32,
    pub north: f32,
}

impl Rectangle {
    pub const fn new(west: f32, south: f32, east: f32, north: f32) -> Self {
        Self { west, south, east, north }
    }

    /// The whole globe, `[-180, 180] x [-90, 90]`.
    pub const fn globe() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    pub fn from_ranges(lon: Range, lat: Range) -> Self {
        Self::new(lon.min, lat.min, lon.max, lat.max)
    }

    pub fn lon_range(&self) -> Range {
        Range::new(self.west, self.east)
    }

    pub fn lat_range(&self) -> Range {
        Range::new(self.south, self.north)
    }

    /// Convert a radian rectangle to degrees, clamped to the valid globe.
    pub fn radians_to_clamped_degrees(&self) -> Self {
        use std::f32::consts::{FRAC_PI_2, PI};
        Self::new(
            self.west.max(-PI).to_degrees(),
            self.south.max(-FRAC_PI_2).to_degrees(),
            self.east.min(PI).to_degrees(),
            self.north.min(FRAC_PI_2).to_degrees(),
        )
    }

    /// Inclusive containment. Longitudes are also tested one turn either
    /// side so rectangles given in `[0, 360]` accept wrapped positions.
    pub fn contains(&self, lon: f32, lat: f32) -> bool {
        let lon_range = self.lon_range();
        self.lat_range().contains(lat)
            && (lon_range.contains(lon)
                || lon_range.contains(lon + 360.0)
                || lon_range.contains(lon - 360.0))
    }
}

/// Length of one degree of longitude and latitude, in metres, at `lat_deg`.
///
/// See <https://en.wikipedia.org/wiki/Geographic_coordinate_system#Length_of_a_degree>.
pub fn meters_per_degree(lat_deg: f32) -> Vec2 {
    let lat = lat_deg.to_radians();

    let lat_length = 111_132.92 - 559.82 * (2.0 * lat).cos() + 1.175 * (4.0 * lat).cos()
        - 0.0023 * (6.0 * lat).cos();
    let lon_length = 111_412.84 * lat.cos() - 93.5 * (3.0 * lat).cos() + 0.118 * (5.0 * lat).cos();

    Vec2::new(lon_length, lat_length)
}

/// Metres per degree of longitude at `lat_deg`.
pub fn meters_per_degree_longitude(lat_deg: f32) -> f32 {
    meters_per_degree(lat_deg).x
}

/// Convert a metric velocity at latitude `lat_deg` into degrees.
///
/// The latitude is clamped to [`CONVERSION_LATITUDE_LIMIT`].
pub fn velocity_to_degrees(lat_deg: f32, velocity: Vec2) -> Vec2 {
    let lat = lat_deg.clamp(-CONVERSION_LATITUDE_LIMIT, CONVERSION_LATITUDE_LIMIT);
    velocity / meters_per_degree(lat)
}

/// Wrap a longitude into `[-180, 180]`. Values already inside are unchanged.
pub fn wrap_longitude(lon: f32) -> f32 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        lon - 360.0 * ((lon + 180.0) / 360.0).floor()
    }
}

/// Clamp a latitude into `[-90, 90]`.
pub fn clamp_latitude(lat: f32) -> f32 {
    lat.clamp(-90.0, 90.0)
}

/// Speed magnitude mapped into `[0, 1]` over the field's speed range.
///
/// Calm air maps to zero. A degenerate range (a uniform field) maps any
/// non-zero wind to one.
pub fn wind_norm(velocity: Vec2, speed_range: Range) -> f32 {
    let speed = velocity.length();
    if speed == 0.0 {
        return 0.0;
    }
    let span = speed_range.span();
    if span <= 0.0 {
        return 1.0;
    }
    ((speed - speed_range.min) / span).clamp(0.0, 1.0)
}

/// Pick the longitude branch (`lon`, `lon ± 360`) closest to `center_lon`.
pub fn nearest_longitude_branch(lon: f32, center_lon: f32) -> f32 {
    let mut best = lon;
    for candidate in [lon - 360.0, lon + 360.0] {
        if (candidate - center_lon).abs() < (best - center_lon).abs() {
            best = candidate;
        }
    }
    best
}

/// Equirectangular (geographic) projection used by the flat scene modes:
/// `(lon_rad * a, lat_rad * a, height)`.
pub fn geographic_projection(lon_deg: f32, lat_deg: f32, height: f32) -> Vec3 {
    Vec3::new(
        lon_deg.to_radians() * WGS84_SEMI_MAJOR_AXIS,
        lat_deg.to_radians() * WGS84_SEMI_MAJOR_AXIS,
        height,
    )
}

/// Earth-centred, earth-fixed Cartesian position on the WGS84 ellipsoid.
pub fn cartographic_to_cartesian(lon_deg: f32, lat_deg: f32, height: f32) -> Vec3 {
    let lon = lon_deg.to_radians();
    let lat = lat_deg.to_radians();
    let sin_lat = lat.sin();
    let n = WGS84_SEMI_MAJOR_AXIS / (1.0 - WGS84_ECCENTRICITY_SQUARED * sin_lat * sin_lat).sqrt();

    Vec3::new(
        (n + height) * lat.cos() * lon.cos(),
        (n + height) * lat.cos() * lon.sin(),
        (n * (1.0 - WGS84_ECCENTRICITY_SQUARED) + height) * sin_lat,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== Degree Length Tests ==========

    #[test]
    fn test_meters_per_degree_at_equator() {
        let m = meters_per_degree(0.0);
        // 111412.84 - 93.5 + 0.118
        assert!((m.x - 111_319.46).abs() < 0.5);
        // 111132.92 - 559.82 + 1.175 - 0.0023
        assert!((m.y - 110_574.27).abs() < 0.5);
    }

    #[test]
    fn test_longitude_length_shrinks_with_latitude() {
        let equator = meters_per_degree_longitude(0.0);
        let sixty = meters_per_degree_longitude(60.0);
        assert!(sixty < equator * 0.51);
        assert!(sixty > equator * 0.49);
        assert!(meters_per_degree_longitude(89.9) < 500.0);
    }

    #[test]
    fn test_velocity_to_degrees_is_finite_at_pole() {
        let d = velocity_to_degrees(90.0, Vec2::new(10.0, 10.0));
        assert!(d.is_finite());
        assert_eq!(d, velocity_to_degrees(CONVERSION_LATITUDE_LIMIT, Vec2::new(10.0, 10.0)));
    }

    #[test]
    fn test_velocity_to_degrees() {
        let d = velocity_to_degrees(0.0, Vec2::new(1.0, 0.0));
        assert!((d.x - 1.0 / meters_per_degree_longitude(0.0)).abs() < 1e-12);
        assert_eq!(d.y, 0.0);
    }

    // ========== Wrap / Clamp Tests ==========

    #[test]
    fn test_wrap_longitude() {
        assert_eq!(wrap_longitude(0.0), 0.0);
        assert_eq!(wrap_longitude(180.0), 180.0);
        assert_eq!(wrap_longitude(-180.0), -180.0);
        assert!((wrap_longitude(181.0) - (-179.0)).abs() < 1e-4);
        assert!((wrap_longitude(-181.0) - 179.0).abs() < 1e-4);
        assert!((wrap_longitude(540.5) - (-179.5)).abs() < 1e-3);
    }

    #[test]
    fn test_clamp_latitude_does_not_wrap() {
        assert_eq!(clamp_latitude(91.0), 90.0);
        assert_eq!(clamp_latitude(-95.0), -90.0);
        assert_eq!(clamp_latitude(45.0), 45.0);
    }

    #[test]
    fn test_nearest_longitude_branch() {
        assert_eq!(nearest_longitude_branch(-179.0, 170.0), 181.0);
        assert_eq!(nearest_longitude_branch(179.0, -170.0), -181.0);
        assert_eq!(nearest_longitude_branch(10.0, 0.0), 10.0);
    }

    // ========== Speed Norm Tests ==========

    #[test]
    fn test_wind_norm_zero() {
        assert_eq!(wind_norm(Vec2::ZERO, Range::new(0.0, 20.0)), 0.0);
    }

    #[test]
    fn test_wind_norm_is_sign_independent() {
        let range = Range::new(0.0, 20.0);
        let a = wind_norm(Vec2::new(5.0, -2.5), range);
        let b = wind_norm(Vec2::new(-5.0, 2.5), range);
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn test_wind_norm_spans_speed_range() {
        let range = Range::new(2.0, 22.0);
        assert!((wind_norm(Vec2::new(12.0, 0.0), range) - 0.5).abs() < 1e-6);
        assert!((wind_norm(Vec2::new(0.0, -22.0), range) - 1.0).abs() < 1e-6);
        assert_eq!(wind_norm(Vec2::new(1.0, 0.0), range), 0.0);
    }

    #[test]
    fn test_wind_norm_stays_in_unit_interval() {
        let range = Range::new(0.0, 15.0);
        for speed in [0.5f32, 3.0, 8.5, 10.0, 15.0, 40.0, 120.0] {
            let n = wind_norm(Vec2::new(speed * 0.6, speed * 0.8), range);
            assert!((0.0..=1.0).contains(&n), "norm({}) = {}", speed, n);
        }
        assert!((wind_norm(Vec2::new(6.0, 8.0), range) - 10.0 / 15.0).abs() < 1e-6);
    }

    #[test]
    fn test_wind_norm_degenerate_range() {
        let range = Range::new(4.0, 4.0);
        assert_eq!(wind_norm(Vec2::new(4.0, 0.0), range), 1.0);
        assert_eq!(wind_norm(Vec2::ZERO, range), 0.0);
    }

    // ========== Rectangle Tests ==========

    #[test]
    fn test_rectangle_contains_is_inclusive() {
        let r = Rectangle::new(-10.0, -5.0, 10.0, 5.0);
        assert!(r.contains(10.0, 5.0));
        assert!(r.contains(-10.0, -5.0));
        assert!(!r.contains(10.001, 0.0));
        assert!(!r.contains(0.0, -5.001));
    }

    #[test]
    fn test_rectangle_contains_wrapped_longitudes() {
        let r = Rectangle::new(0.0, -90.0, 360.0, 90.0);
        assert!(r.contains(-90.0, 0.0));
    }

    #[test]
    fn test_radians_to_clamped_degrees() {
        use std::f32::consts::PI;
        let r = Rectangle::new(-4.0, -2.0, 4.0, 2.0).radians_to_clamped_degrees();
        assert_eq!(r.west, (-PI).to_degrees());
        assert_eq!(r.east, PI.to_degrees());
        assert!((r.north - 90.0).abs() < 1e-4);
        assert!((r.south + 90.0).abs() < 1e-4);
    }

    // ========== Projection Tests ==========

    #[test]
    fn test_cartesian_on_equator_prime_meridian() {
        let p = cartographic_to_cartesian(0.0, 0.0, 0.0);
        assert!((p.x - WGS84_SEMI_MAJOR_AXIS).abs() < 1.0);
        assert!(p.y.abs() < 1e-3);
        assert!(p.z.abs() < 1e-3);
    }

    #[test]
    fn test_cartesian_height_moves_outward() {
        let ground = cartographic_to_cartesian(45.0, 30.0, 0.0);
        let raised = cartographic_to_cartesian(45.0, 30.0, 1000.0);
        assert!((raised.length() - ground.length() - 1000.0).abs() < 2.0);
    }

    #[test]
    fn test_geographic_projection() {
        let p = geographic_projection(180.0, 0.0, 5.0);
        assert!((p.x - std::f32::consts::PI * WGS84_SEMI_MAJOR_AXIS).abs() < 1.0);
        assert_eq!(p.y, 0.0);
        assert_eq!(p.z, 5.0);
    }
}
