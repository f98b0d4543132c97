//! Utility maths functions
//!
//! Angle helpers operate in radians. The local frame used throughout the
//! software has x pointing north and y pointing east, so bearings are
//! measured from north, positive towards east.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use num_traits::Float;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// WGS-84 semi-major axis.
///
/// Units: meters
pub const WGS84_A: f64 = 6378137.0;

/// WGS-84 first eccentricity squared.
pub const WGS84_E2: f64 = 0.00669437999013;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Clamp a value between a minimum and maximum.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float,
{
    if value > max {
        max
    } else if value < min {
        min
    } else {
        value
    }
}

/// Normalize an angle into the range (-pi, pi].
pub fn normalize_rad<T>(angle: T) -> T
where
    T: Float,
{
    let pi = T::from(std::f64::consts::PI).unwrap();
    let tau = T::from(std::f64::consts::TAU).unwrap();

    let mut a = angle % tau;

    if a > pi {
        a = a - tau;
    }
    if a <= -pi {
        a = a + tau;
    }

    a
}

/// Euclidean norm of a 2D vector given by its components.
pub fn norm2(x: f64, y: f64) -> f64 {
    x.hypot(y)
}

/// Get the bearing and horizontal range from one local-frame point to
/// another.
///
/// The bearing is measured from north (x axis), positive east.
pub fn bearing_and_range(from: &Vector3<f64>, to: &Vector3<f64>) -> (f64, f64) {
    let dx = to.x - from.x;
    let dy = to.y - from.y;

    (dy.atan2(dx), norm2(dx, dy))
}

/// Displace a local-frame point horizontally by a bearing and range. The
/// vertical component is preserved.
pub fn set_bearing_and_range(origin: &Vector3<f64>, bearing: f64, range: f64) -> Vector3<f64> {
    Vector3::new(
        origin.x + range * bearing.cos(),
        origin.y + range * bearing.sin(),
        origin.z,
    )
}

/// Meridional and normal radii of curvature at the given geodetic latitude.
fn curvature_radii(lat: f64) -> (f64, f64) {
    let s = lat.sin();
    let den = 1.0 - WGS84_E2 * s * s;
    let rn = WGS84_A / den.sqrt();
    let rm = rn * (1.0 - WGS84_E2) / den;

    (rm, rn)
}

/// North/east displacement in meters from a WGS-84 reference to a target.
///
/// Valid for the small displacements encountered when projecting path
/// references into the local frame (a few kilometers at most). Latitude and
/// longitude are in radians.
pub fn wgs84_displacement(ref_lat: f64, ref_lon: f64, lat: f64, lon: f64) -> (f64, f64) {
    let (rm, rn) = curvature_radii(ref_lat);

    let north = (lat - ref_lat) * rm;
    let east = (lon - ref_lon) * rn * ref_lat.cos();

    (north, east)
}

/// Displace a WGS-84 position by north/east meters, returning the new
/// latitude and longitude in radians.
pub fn wgs84_displace(lat: f64, lon: f64, north: f64, east: f64) -> (f64, f64) {
    let (rm, rn) = curvature_radii(lat);

    (lat + north / rm, lon + east / (rn * lat.cos()))
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const PI: f64 = std::f64::consts::PI;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(0.5f64, 0.0, 1.0), 0.5);
        assert_eq!(clamp(-0.5f64, 0.0, 1.0), 0.0);
        assert_eq!(clamp(1.5f64, 0.0, 1.0), 1.0);
    }

    #[test]
    fn test_normalize_rad() {
        assert!((normalize_rad(0.0f64)).abs() < 1e-12);
        assert!((normalize_rad(PI) - PI).abs() < 1e-12);
        assert!((normalize_rad(-PI) - PI).abs() < 1e-12);
        assert!((normalize_rad(3.0 * PI) - PI).abs() < 1e-12);
        assert!((normalize_rad(PI + 0.1) - (-PI + 0.1)).abs() < 1e-12);
        assert!((normalize_rad(-PI - 0.1) - (PI - 0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_bearing_and_range() {
        let origin = Vector3::new(0.0, 0.0, 0.0);

        // Due north
        let (b, r) = bearing_and_range(&origin, &Vector3::new(10.0, 0.0, 0.0));
        assert!(b.abs() < 1e-12);
        assert!((r - 10.0).abs() < 1e-12);

        // Due east
        let (b, r) = bearing_and_range(&origin, &Vector3::new(0.0, 5.0, 0.0));
        assert!((b - PI / 2.0).abs() < 1e-12);
        assert!((r - 5.0).abs() < 1e-12);

        // set_bearing_and_range is the inverse operation
        let p = set_bearing_and_range(&origin, 1.0, 25.0);
        let (b, r) = bearing_and_range(&origin, &p);
        assert!((b - 1.0).abs() < 1e-9);
        assert!((r - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_wgs84_round_trip() {
        // Atlantic, off Porto
        let lat = 0.7188;
        let lon = -0.152;

        let (nlat, nlon) = wgs84_displace(lat, lon, 150.0, -75.0);
        let (n, e) = wgs84_displacement(lat, lon, nlat, nlon);

        assert!((n - 150.0).abs() < 0.01);
        assert!((e - (-75.0)).abs() < 0.01);
    }

    #[test]
    fn test_wgs84_displacement_north() {
        // A pure latitude change maps to a northward displacement of
        // delta-lat times the meridional radius
        let lat = 0.7188;
        let lon = -0.152;
        let dlat = 1e-4;

        let (n, e) = wgs84_displacement(lat, lon, lat + dlat, lon);

        // Meridional radius at 41 degrees is roughly 6363 km
        assert!((n - dlat * 6.363e6).abs() < 50.0);
        assert!(e.abs() < 1e-6);
    }
}
