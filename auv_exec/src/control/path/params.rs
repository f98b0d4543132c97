//! Parameters for the path controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use crate::config::ParamError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Path controller parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Control frequency for EstimatedState processing.
    ///
    /// Units: Hertz
    pub control_frequency_hz: f64,

    /// State report frequency.
    ///
    /// Units: Hertz
    pub state_report_frequency_hz: f64,

    /// Enable course control (steer the ground course rather than the
    /// heading).
    pub course_control: bool,

    /// Line-of-sight lookahead distance used by the steering law.
    ///
    /// Units: meters
    pub los_lookahead_m: f64,

    pub along_track: AlongTrackParams,
    pub cross_track: CrossTrackParams,
    pub bottom_track: BottomTrackParams,
}

/// Along-track divergence monitor parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlongTrackParams {
    /// Enable along-track error monitoring.
    pub monitor: bool,

    /// Period between progress checks.
    ///
    /// Units: seconds
    pub check_period_s: f64,

    /// Minimum speed for along-track progress.
    ///
    /// Units: meters/second
    pub min_speed_ms: f64,

    /// Minimum yaw rate for track bearing convergence.
    ///
    /// Units: degrees/second
    pub min_yaw_degs: f64,
}

/// Cross-track divergence monitor parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrossTrackParams {
    /// Enable cross-track error monitoring.
    pub monitor: bool,

    /// Distance threshold for cross-track error.
    ///
    /// Units: meters
    pub distance_limit_m: f64,

    /// Time the error may persist before divergence is declared.
    ///
    /// Units: seconds
    pub time_limit_s: f64,

    /// Navigation uncertainty factor; negative disables the correction.
    pub nav_unc_factor: f64,
}

/// Bottom tracker parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BottomTrackParams {
    /// Enable or disable bottom track control.
    pub enabled: bool,

    /// Number of samples in the forward range moving average.
    pub forward_samples: usize,

    /// Safe pitch angle to perform bottom tracking.
    ///
    /// Units: degrees
    pub safe_pitch_deg: f64,

    /// Slope hysteresis when recovering from avoidance.
    ///
    /// Units: degrees
    pub slope_hysteresis_deg: f64,

    /// Minimum admissible altitude.
    ///
    /// Units: meters
    pub min_alt_m: f64,

    /// Minimum admissible forward range.
    ///
    /// Units: meters
    pub min_range_m: f64,

    /// Altitude tolerance used when computing safe depths from depth
    /// references.
    ///
    /// Units: meters
    pub alt_tol_m: f64,

    /// Depth below which altitude measurements are ignored.
    ///
    /// Units: meters
    pub depth_tol_m: f64,

    /// Depth limit for bottom tracking.
    ///
    /// Units: meters
    pub depth_limit_m: f64,

    /// Check the slope angle trend in the unsafe state.
    pub check_trend: bool,

    /// Bottom tracker execution frequency.
    ///
    /// Units: Hertz
    pub frequency_hz: f64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            control_frequency_hz: 10.0,
            state_report_frequency_hz: 1.0,
            course_control: true,
            los_lookahead_m: 10.0,
            along_track: AlongTrackParams::default(),
            cross_track: CrossTrackParams::default(),
            bottom_track: BottomTrackParams::default(),
        }
    }
}

impl Default for AlongTrackParams {
    fn default() -> Self {
        Self {
            monitor: true,
            check_period_s: 15.0,
            min_speed_ms: 0.25,
            min_yaw_degs: 10.0,
        }
    }
}

impl Default for CrossTrackParams {
    fn default() -> Self {
        Self {
            monitor: true,
            distance_limit_m: 15.0,
            time_limit_s: 10.0,
            nav_unc_factor: -1.0,
        }
    }
}

impl Default for BottomTrackParams {
    fn default() -> Self {
        Self {
            enabled: false,
            forward_samples: 5,
            safe_pitch_deg: 15.0,
            slope_hysteresis_deg: 1.5,
            min_alt_m: 1.0,
            min_range_m: 4.0,
            alt_tol_m: 2.0,
            depth_tol_m: 1.0,
            depth_limit_m: 48.0,
            check_trend: true,
            frequency_hz: 5.0,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), ParamError> {
        util::params::check_range(
            "control_frequency_hz",
            self.control_frequency_hz,
            Some(0.1),
            Some(100.0),
        )?;
        util::params::check_range(
            "state_report_frequency_hz",
            self.state_report_frequency_hz,
            Some(0.1),
            Some(10.0),
        )?;
        util::params::check_range("los_lookahead_m", self.los_lookahead_m, Some(1.0), None)?;
        util::params::check_range(
            "along_track.check_period_s",
            self.along_track.check_period_s,
            Some(1.0),
            None,
        )?;
        util::params::check_range(
            "along_track.min_speed_ms",
            self.along_track.min_speed_ms,
            Some(0.0),
            None,
        )?;
        util::params::check_range(
            "cross_track.distance_limit_m",
            self.cross_track.distance_limit_m,
            Some(1.0),
            None,
        )?;
        util::params::check_range(
            "cross_track.time_limit_s",
            self.cross_track.time_limit_s,
            Some(0.0),
            None,
        )?;
        util::params::check_range(
            "bottom_track.forward_samples",
            self.bottom_track.forward_samples as i64,
            Some(1),
            Some(64),
        )?;
        util::params::check_range(
            "bottom_track.frequency_hz",
            self.bottom_track.frequency_hz,
            Some(0.1),
            Some(50.0),
        )?;

        Ok(())
    }
}
