//! Path controller tracking state and divergence monitors

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::Serialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Loiter geometry held in the tracking state.
#[derive(Debug, Default, Clone, Serialize)]
pub struct LoiterState {
    /// Circle center in the local frame.
    ///
    /// Units: meters
    pub center: Vector3<f64>,

    /// Units: meters
    pub radius: f64,

    pub clockwise: bool,
}

/// Tracking state of the current path, recomputed on every control step.
#[derive(Debug, Clone, Serialize)]
pub struct TrackingState {
    /// Track start and end points in the local frame.
    ///
    /// Units: meters
    pub start: Vector3<f64>,
    pub end: Vector3<f64>,

    /// Time the path was accepted and the time the end point was reached
    /// (negative while en-route).
    pub start_time: f64,
    pub end_time: f64,

    /// Time of the current control step and the step duration.
    pub now: f64,
    pub delta: f64,

    /// Bearing and length of the track frame.
    ///
    /// Units: radians / meters
    pub track_bearing: f64,
    pub track_length: f64,

    /// Line-of-sight angle and range to the end point.
    ///
    /// Units: radians / meters
    pub los_angle: f64,
    pub range: f64,

    /// True when steering the ground course rather than the heading.
    pub course_control: bool,

    /// Current course, speed and course error.
    ///
    /// Units: radians / meters/second
    pub course: f64,
    pub speed: f64,
    pub course_error: f64,

    /// Position and velocity in the track frame: x along-track, y
    /// cross-track, z vertical-track.
    ///
    /// Units: meters, meters/second
    pub track_pos: Vector3<f64>,
    pub track_vel: Vector3<f64>,

    /// Estimated time of arrival at the end point.
    ///
    /// Units: seconds
    pub eta: f64,

    /// The vehicle is within one control period of the end point.
    pub nearby: bool,

    /// The controller is circling the loiter center.
    pub loitering: bool,

    /// A vertical reference is being handled for this path.
    pub z_control: bool,

    /// Units of the vertical reference in use.
    pub z_units: bus_if::msg::ZUnits,

    pub loiter: LoiterState,
}

/// Along-track divergence monitor.
///
/// Progress is measured on the along-track position when roughly aligned
/// with the track, and on the course error otherwise. Expected progress per
/// check period is `period * min_speed` (or `period * min_yaw`).
#[derive(Debug, Default, Clone)]
pub struct AlongTrackMonitor {
    pub enabled: bool,

    /// Units: seconds
    pub period: f64,

    /// Units: meters/second
    pub min_speed: f64,

    /// Units: radians/second
    pub min_yaw: f64,

    /// Time of the next check.
    pub time: f64,

    /// Along-track position at the last check.
    pub last_err: f64,

    /// Absolute course error at the last check.
    pub last_course_err: f64,

    pub diverging: bool,
}

/// Cross-track divergence monitor.
#[derive(Debug, Default, Clone)]
pub struct CrossTrackMonitor {
    pub enabled: bool,

    /// Units: meters
    pub distance_limit: f64,

    /// Units: seconds
    pub time_limit: f64,

    /// Scale factor applied to the navigation uncertainty; non-positive
    /// disables the correction.
    pub nav_unc_factor: f64,

    /// Current distance-limit inflation from navigation uncertainty.
    ///
    /// Units: meters
    pub nav_uncertainty: f64,

    pub diverging: bool,

    /// Time divergence started.
    pub divergence_started: f64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for TrackingState {
    fn default() -> Self {
        Self {
            start: Vector3::zeros(),
            end: Vector3::zeros(),
            start_time: 0.0,
            end_time: 0.0,
            now: 0.0,
            delta: 0.0,
            track_bearing: 0.0,
            track_length: 0.0,
            los_angle: 0.0,
            range: 0.0,
            course_control: true,
            course: 0.0,
            speed: 0.0,
            course_error: 0.0,
            track_pos: Vector3::zeros(),
            track_vel: Vector3::zeros(),
            eta: 0.0,
            nearby: false,
            loitering: false,
            z_control: false,
            z_units: bus_if::msg::ZUnits::None,
            loiter: LoiterState::default(),
        }
    }
}
