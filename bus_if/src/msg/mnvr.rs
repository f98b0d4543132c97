//! # Maneuver intent and execution-state messages

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::{SpeedUnits, ZUnits};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Execution state of the active maneuver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManeuverControlState {
    pub state: McsState,

    /// Estimated time to completion.
    ///
    /// Units: seconds
    pub eta: u16,

    /// Human readable information, mandatory for error reports.
    pub info: String,
}

/// Keep-position null maneuver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdleManeuver {
    /// Duration to idle for, zero for unbounded.
    ///
    /// Units: seconds
    pub duration: u16,
}

/// Sustained circular flight around a point at a fixed radius and signed
/// direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loiter {
    /// Loiter center.
    ///
    /// Units: radians / meters
    pub lat: f64,
    pub lon: f64,
    pub z: f64,
    pub z_units: ZUnits,

    /// Units: meters
    pub radius: f64,

    pub speed: f64,
    pub speed_units: SpeedUnits,

    pub direction: LoiterDirection,

    /// Duration to loiter for once on the circle, zero for unbounded.
    ///
    /// Units: seconds
    pub duration: u16,
}

/// Hold position about a point: transit there, then keep within a radius,
/// re-approaching whenever the vehicle drifts out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationKeeping {
    /// Units: radians / meters
    pub lat: f64,
    pub lon: f64,
    pub z: f64,
    pub z_units: ZUnits,

    /// Radius to keep station within.
    ///
    /// Units: meters
    pub radius: f64,

    pub speed: f64,
    pub speed_units: SpeedUnits,

    /// Duration to keep station for, zero for unbounded.
    ///
    /// Units: seconds
    pub duration: u16,
}

/// Transit to a single waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goto {
    /// Units: radians / meters
    pub lat: f64,
    pub lon: f64,
    pub z: f64,
    pub z_units: ZUnits,

    pub speed: f64,
    pub speed_units: SpeedUnits,
}

/// External direct control of the vehicle's actuators.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teleoperation {
    /// Optional operator annotation.
    pub custom: String,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Maneuver execution states.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum McsState {
    Executing,
    Done,
    Error,
}

/// Loiter direction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum LoiterDirection {
    Clockwise,
    CounterClockwise,
}
