//! # Navigation and ranging messages

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Estimated 9-DOF vehicle state in a local frame anchored at
/// (`lat`, `lon`, `height`).
///
/// The local frame has x north, y east, z down. Body velocities are
/// (`u`, `v`, `w`), angular rates (`p`, `q`, `r`) and ground velocities
/// (`vx`, `vy`, `vz`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatedState {
    /// Latitude of the local frame origin.
    ///
    /// Units: radians
    pub lat: f64,

    /// Longitude of the local frame origin.
    ///
    /// Units: radians
    pub lon: f64,

    /// Height of the local frame origin above the WGS-84 ellipsoid.
    ///
    /// Units: meters
    pub height: f64,

    /// Position in the local frame.
    ///
    /// Units: meters
    pub x: f64,
    pub y: f64,
    pub z: f64,

    /// Euler angles.
    ///
    /// Units: radians
    pub phi: f64,
    pub theta: f64,
    pub psi: f64,

    /// Body-frame velocities.
    ///
    /// Units: meters/second
    pub u: f64,
    pub v: f64,
    pub w: f64,

    /// Angular rates.
    ///
    /// Units: radians/second
    pub p: f64,
    pub q: f64,
    pub r: f64,

    /// Ground velocities in the local frame.
    ///
    /// Units: meters/second
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,

    /// Depth below the surface.
    ///
    /// Units: meters
    pub depth: f64,

    /// Altitude above the bottom, negative when no valid measurement exists.
    ///
    /// Units: meters
    pub alt: f64,
}

/// A range measurement from a distance sensor (e.g. forward-looking echo
/// sounder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    /// Measured distance.
    ///
    /// Units: meters
    pub value: f64,

    /// Measurement validity.
    pub validity: DistanceValidity,
}

/// Position uncertainty reported by the navigation estimator.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationUncertainty {
    /// Variance of the north position estimate.
    ///
    /// Units: meters^2
    pub x: f64,

    /// Variance of the east position estimate.
    ///
    /// Units: meters^2
    pub y: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Validity of a [`Distance`] measurement.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum DistanceValidity {
    Invalid,
    Valid,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for EstimatedState {
    fn default() -> Self {
        Self {
            lat: 0.0,
            lon: 0.0,
            height: 0.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            phi: 0.0,
            theta: 0.0,
            psi: 0.0,
            u: 0.0,
            v: 0.0,
            w: 0.0,
            p: 0.0,
            q: 0.0,
            r: 0.0,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            depth: 0.0,
            // Negative until a valid bottom lock exists
            alt: -1.0,
        }
    }
}
