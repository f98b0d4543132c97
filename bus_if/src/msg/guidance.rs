//! # Guidance reference and tracking-state messages

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A desired path reference consumed by the path controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredPath {
    /// Path start point. Only used when [`DesiredPathFlags::START`] is set.
    ///
    /// Units: radians / meters
    pub start_lat: f64,
    pub start_lon: f64,
    pub start_z: f64,
    pub start_z_units: ZUnits,

    /// Path end point.
    ///
    /// Units: radians / meters
    pub end_lat: f64,
    pub end_lon: f64,
    pub end_z: f64,
    pub end_z_units: ZUnits,

    /// Speed reference along the path.
    pub speed: f64,
    pub speed_units: SpeedUnits,

    /// Loiter radius; a positive value requests loitering about the end
    /// point.
    ///
    /// Units: meters
    pub lradius: f64,

    /// Path handling flags.
    pub flags: DesiredPathFlags,
}

/// Vertical reference (depth, altitude or height).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredZ {
    /// Units: meters
    pub value: f64,
    pub z_units: ZUnits,
}

/// Speed reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredSpeed {
    pub value: f64,
    pub speed_units: SpeedUnits,
}

/// Heading reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredHeading {
    /// Units: radians
    pub value: f64,
}

/// Path controller tracking report.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathControlState {
    /// Effective path start and end points.
    ///
    /// Units: radians / meters
    pub start_lat: f64,
    pub start_lon: f64,
    pub start_z: f64,
    pub start_z_units: ZUnits,
    pub end_lat: f64,
    pub end_lon: f64,
    pub end_z: f64,
    pub end_z_units: ZUnits,

    /// Loiter radius, zero when not loitering.
    ///
    /// Units: meters
    pub lradius: f64,

    /// Along-track distance remaining, cross-track and vertical-track error.
    ///
    /// Units: meters
    pub x: f64,
    pub y: f64,
    pub z: f64,

    /// Along/cross/vertical track velocities.
    ///
    /// Units: meters/second
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,

    /// Course error relative to the track bearing.
    ///
    /// Units: radians
    pub course_error: f64,

    /// Estimated time of arrival at the end point.
    ///
    /// Units: seconds
    pub eta: u16,

    pub flags: PathCtrlFlags,
}

/// Brake actuation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brake {
    pub op: BrakeOp,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Units of a vertical reference.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum ZUnits {
    None,
    Depth,
    Altitude,
    Height,
}

/// Units of a speed reference.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum SpeedUnits {
    MetersPs,
    Rpm,
    Percent,
}

/// Brake operations.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum BrakeOp {
    Start,
    Stop,
}

// ---------------------------------------------------------------------------
// FLAGS
// ---------------------------------------------------------------------------

/// Flag bits of a [`DesiredPath`].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesiredPathFlags(pub u8);

impl DesiredPathFlags {
    /// Use the explicit start point instead of the current position.
    pub const START: DesiredPathFlags = DesiredPathFlags(0x01);
    /// Start from the current position even if a previous path just ended.
    pub const DIRECT: DesiredPathFlags = DesiredPathFlags(0x02);
    /// Loiter counter-clockwise (clockwise is the default).
    pub const CCLOCKW: DesiredPathFlags = DesiredPathFlags(0x04);
    /// Loiter about the current position.
    pub const LOITER_CURR: DesiredPathFlags = DesiredPathFlags(0x08);
    /// Do not emit a vertical reference.
    pub const NO_Z: DesiredPathFlags = DesiredPathFlags(0x10);

    pub fn contains(&self, other: DesiredPathFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: DesiredPathFlags) {
        self.0 |= other.0;
    }
}

/// Flag bits of a [`PathControlState`].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathCtrlFlags(pub u8);

impl PathCtrlFlags {
    /// The vehicle is within one control period of the path end point.
    pub const NEAR: PathCtrlFlags = PathCtrlFlags(0x01);
    /// The controller is loitering about the end point.
    pub const LOITERING: PathCtrlFlags = PathCtrlFlags(0x02);
    /// No vertical reference is being handled for this path.
    pub const NO_Z: PathCtrlFlags = PathCtrlFlags(0x04);

    pub fn contains(&self, other: PathCtrlFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: PathCtrlFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: PathCtrlFlags) {
        self.0 &= !other.0;
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for ZUnits {
    fn default() -> Self {
        ZUnits::None
    }
}

impl Default for SpeedUnits {
    fn default() -> Self {
        SpeedUnits::MetersPs
    }
}

impl Default for DesiredPath {
    fn default() -> Self {
        Self {
            start_lat: 0.0,
            start_lon: 0.0,
            start_z: 0.0,
            start_z_units: ZUnits::None,
            end_lat: 0.0,
            end_lon: 0.0,
            end_z: 0.0,
            end_z_units: ZUnits::None,
            speed: 0.0,
            speed_units: SpeedUnits::MetersPs,
            lradius: 0.0,
            flags: DesiredPathFlags::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_desired_path_flags() {
        let mut flags = DesiredPathFlags::default();
        assert!(!flags.contains(DesiredPathFlags::START));

        flags.insert(DesiredPathFlags::START);
        flags.insert(DesiredPathFlags::CCLOCKW);
        assert!(flags.contains(DesiredPathFlags::START));
        assert!(flags.contains(DesiredPathFlags::CCLOCKW));
        assert!(!flags.contains(DesiredPathFlags::NO_Z));
    }

    #[test]
    fn test_path_ctrl_flags() {
        let mut flags = PathCtrlFlags::default();
        flags.insert(PathCtrlFlags::NEAR);
        flags.insert(PathCtrlFlags::LOITERING);
        flags.remove(PathCtrlFlags::NEAR);
        assert!(!flags.contains(PathCtrlFlags::NEAR));
        assert!(flags.contains(PathCtrlFlags::LOITERING));
    }
}
