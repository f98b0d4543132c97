//! Forward-range slope estimation window
//!
//! Maintains a sliding average of forward-looking range samples and derives
//! the slope angle of the terrain ahead. The slope top (the shallowest
//! point the beam has hit) is tracked in the local frame so the state
//! machine can tell when the vehicle has cleared it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::VecDeque;

use bus_if::msg::{Distance, DistanceValidity, EstimatedState};
use util::maths;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Horizontal distance below which the slope top counts as reached.
///
/// Units: meters
const TOP_DISTANCE_TOL_M: f64 = 1.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Recorded slope top.
#[derive(Debug, Clone, Copy)]
struct SlopeTop {
    /// Local-frame position of the top.
    ///
    /// Units: meters
    x: f64,
    y: f64,

    /// Depth of the terrain at the top.
    ///
    /// Units: meters
    depth: f64,
}

/// Sliding window over forward-range samples with slope detection.
pub struct SlopeData {
    samples: VecDeque<f64>,
    fsamples: usize,

    /// Units: meters
    min_range: f64,

    /// Units: radians
    safe_pitch: f64,
    slope_hyst: f64,

    /// Averaged forward range.
    ///
    /// Units: meters
    frange: f64,

    /// Detected slope angle and its previous value.
    ///
    /// Units: radians
    slope: f64,
    prev_slope: f64,

    /// Latched too-steep state, released with hysteresis.
    steep: bool,

    top: Option<SlopeTop>,

    got_range: bool,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl SlopeData {
    pub fn new(fsamples: usize, min_range: f64, safe_pitch: f64, slope_hyst: f64) -> Self {
        Self {
            samples: VecDeque::with_capacity(fsamples.max(1)),
            fsamples: fsamples.max(1),
            min_range,
            safe_pitch,
            slope_hyst,
            frange: 0.0,
            slope: 0.0,
            prev_slope: 0.0,
            steep: false,
            top: None,
            got_range: false,
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.frange = 0.0;
        self.slope = 0.0;
        self.prev_slope = 0.0;
        self.steep = false;
        self.top = None;
        self.got_range = false;
    }

    /// Feed one forward range sample, updating the moving average and the
    /// detected slope.
    pub fn on_distance(&mut self, msg: &Distance, state: &EstimatedState) {
        if msg.validity != DistanceValidity::Valid {
            return;
        }

        if self.samples.len() == self.fsamples {
            self.samples.pop_front();
        }
        self.samples.push_back(msg.value);

        self.frange = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        self.got_range = true;

        // Terrain rise seen by the beam relative to the vehicle's bottom:
        // with the beam pitched with the vehicle, the echo point sits
        // frange*sin(theta) above the current depth and frange*cos(theta)
        // ahead
        if state.alt >= 0.0 {
            let rise = state.alt + self.frange * state.theta.sin();
            let run = self.frange * state.theta.cos();

            self.prev_slope = self.slope;
            self.slope = rise.atan2(run.max(0.1));
        }
    }

    /// Averaged forward range.
    pub fn frange(&self) -> f64 {
        self.frange
    }

    /// Detected slope angle.
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// True while the averaged forward range is below the admissible
    /// minimum.
    pub fn is_range_low(&self) -> bool {
        self.got_range && self.frange < self.min_range
    }

    /// Too-steep check with hysteresis: latches above `safe_pitch` and
    /// releases below `safe_pitch - slope_hyst`.
    pub fn is_too_steep(&mut self) -> bool {
        if self.steep {
            if self.slope < self.safe_pitch - self.slope_hyst {
                self.steep = false;
            }
        } else if self.slope >= self.safe_pitch {
            self.steep = true;
        }

        self.steep
    }

    /// True if the slope angle is still growing.
    pub fn is_slope_increasing(&self) -> bool {
        self.slope > self.prev_slope
    }

    /// True when the echo may be coming from the surface rather than the
    /// bottom (beam pitched up far enough to break the surface).
    pub fn is_surface(&self, state: &EstimatedState) -> bool {
        state.theta > 0.0 && state.depth - self.frange * state.theta.sin() <= 0.0
    }

    /// Record the slope top from the current measurement, returning the
    /// horizontal distance to it.
    pub fn update_slope_top(&mut self, state: &EstimatedState) -> f64 {
        let run = self.frange * state.theta.cos();

        self.top = Some(SlopeTop {
            x: state.x + run * state.psi.cos(),
            y: state.y + run * state.psi.sin(),
            depth: state.depth - self.frange * state.theta.sin(),
        });

        self.distance_to_slope(state)
    }

    /// Horizontal distance to the recorded slope top, or infinity when none
    /// is recorded.
    pub fn distance_to_slope(&self, state: &EstimatedState) -> f64 {
        match self.top {
            Some(top) => maths::norm2(top.x - state.x, top.y - state.y),
            None => f64::INFINITY,
        }
    }

    /// Depth of the terrain at the recorded slope top, falling back to the
    /// current projection when none is recorded.
    pub fn slope_top_depth(&self, state: &EstimatedState) -> f64 {
        match self.top {
            Some(top) => top.depth,
            None => state.depth - self.frange * state.theta.sin(),
        }
    }

    /// True once the vehicle has passed or come within tolerance of the
    /// recorded slope top.
    pub fn is_top_cleared(&self, state: &EstimatedState) -> bool {
        let top = match self.top {
            Some(t) => t,
            None => return true,
        };

        let dx = top.x - state.x;
        let dy = top.y - state.y;

        if maths::norm2(dx, dy) <= TOP_DISTANCE_TOL_M {
            return true;
        }

        // Behind us when the offset opposes the heading
        dx * state.psi.cos() + dy * state.psi.sin() <= 0.0
    }

    /// Forget the recorded slope top.
    pub fn render_slope_invalid(&mut self) {
        self.top = None;
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn dist(value: f64) -> Distance {
        Distance {
            value,
            validity: DistanceValidity::Valid,
        }
    }

    fn level_state(alt: f64, depth: f64) -> EstimatedState {
        EstimatedState {
            alt,
            depth,
            ..Default::default()
        }
    }

    #[test]
    fn test_moving_average() {
        let mut sd = SlopeData::new(3, 4.0, 0.3, 0.03);
        let es = level_state(10.0, 20.0);

        sd.on_distance(&dist(10.0), &es);
        sd.on_distance(&dist(20.0), &es);
        assert!((sd.frange() - 15.0).abs() < 1e-9);

        sd.on_distance(&dist(30.0), &es);
        sd.on_distance(&dist(40.0), &es);
        // Window slides: (20 + 30 + 40) / 3
        assert!((sd.frange() - 30.0).abs() < 1e-9);

        // Invalid samples are ignored
        sd.on_distance(
            &Distance {
                value: 1000.0,
                validity: DistanceValidity::Invalid,
            },
            &es,
        );
        assert!((sd.frange() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_range_low() {
        let mut sd = SlopeData::new(1, 4.0, 0.3, 0.03);
        assert!(!sd.is_range_low());

        sd.on_distance(&dist(2.0), &level_state(5.0, 10.0));
        assert!(sd.is_range_low());

        sd.on_distance(&dist(8.0), &level_state(5.0, 10.0));
        assert!(!sd.is_range_low());
    }

    #[test]
    fn test_slope_detection_with_hysteresis() {
        // safe pitch ~17.2 deg, hysteresis ~1.7 deg
        let mut sd = SlopeData::new(1, 1.0, 0.3, 0.03);
        let es = level_state(5.0, 20.0);

        // Level vehicle, range 20 m, altitude 5 m: slope ~ atan(5/20), safe
        sd.on_distance(&dist(20.0), &es);
        assert!(!sd.is_too_steep());

        // Wall ahead: short range makes the ratio steep; latch engages
        sd.on_distance(&dist(6.0), &es);
        assert!(sd.is_too_steep());
        assert!(sd.is_slope_increasing());

        // Recovery requires dropping below safe_pitch - hysteresis
        sd.on_distance(&dist(16.4), &es);
        assert!(sd.is_too_steep());

        sd.on_distance(&dist(60.0), &es);
        assert!(!sd.is_too_steep());
    }

    #[test]
    fn test_slope_top_tracking() {
        let mut sd = SlopeData::new(1, 1.0, 0.3, 0.03);
        let mut es = level_state(5.0, 20.0);
        sd.on_distance(&dist(10.0), &es);

        let d = sd.update_slope_top(&es);
        assert!((d - 10.0).abs() < 1e-9);
        assert!(!sd.is_top_cleared(&es));

        // Drive past the top (heading north, top 10 m ahead)
        es.x = 12.0;
        assert!(sd.is_top_cleared(&es));

        sd.render_slope_invalid();
        assert!(sd.is_top_cleared(&level_state(5.0, 20.0)));
        assert!(sd.distance_to_slope(&es).is_infinite());
    }
}
