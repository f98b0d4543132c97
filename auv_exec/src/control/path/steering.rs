//! Steering seam of the path controller
//!
//! The path controller handles reference intake, track geometry and
//! monitoring; the steering law turns the tracking state into lower-level
//! references. Behavior variants implement [`Steering`], the interface the
//! controller consumes.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use bus_if::msg::{DesiredHeading, EstimatedState, Payload};
use util::maths;

use super::params::Params;
use super::state::TrackingState;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A steering law consumed by the path controller.
///
/// `emit` publishes a payload on the controller's behalf; implementations
/// never touch the bus directly.
pub trait Steering: Send {
    /// Pick up steering-relevant parameters after a (re)bind.
    fn configure(&mut self, _params: &Params) {}

    /// Called once when a new path is accepted.
    fn on_path_startup(
        &mut self,
        _state: &EstimatedState,
        _ts: &TrackingState,
        _emit: &mut dyn FnMut(Payload),
    ) {
    }

    fn on_path_activation(&mut self) {}

    fn on_path_deactivation(&mut self) {}

    /// True if this law manages depth/altitude itself, opting out of the
    /// controller's vertical reference handling.
    fn has_specific_z_control(&self) -> bool {
        false
    }

    /// One control step while tracking (also used while loitering, with a
    /// synthetic tangent track).
    fn step(
        &mut self,
        state: &EstimatedState,
        ts: &TrackingState,
        emit: &mut dyn FnMut(Payload),
    );
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Line-of-sight steering: aims at a point a fixed lookahead distance ahead
/// on the track, emitting heading references.
pub struct LosSteering {
    /// Units: meters
    lookahead: f64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl LosSteering {
    pub fn new(lookahead_m: f64) -> Self {
        Self {
            lookahead: lookahead_m.max(1.0),
        }
    }

    pub fn set_lookahead(&mut self, lookahead_m: f64) {
        self.lookahead = lookahead_m.max(1.0);
    }
}

impl Steering for LosSteering {
    fn configure(&mut self, params: &Params) {
        self.set_lookahead(params.los_lookahead_m);
    }

    fn step(
        &mut self,
        _state: &EstimatedState,
        ts: &TrackingState,
        emit: &mut dyn FnMut(Payload),
    ) {
        // Steer towards a virtual point `lookahead` meters ahead on the
        // track, which converges onto the track as the cross-track error
        // shrinks
        let correction = (-ts.track_pos.y).atan2(self.lookahead);
        let heading = maths::normalize_rad(ts.track_bearing + correction);

        emit(Payload::DesiredHeading(DesiredHeading { value: heading }));
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn step_heading(ts: &TrackingState) -> f64 {
        let mut steering = LosSteering::new(10.0);
        let mut heading = None;

        steering.step(&EstimatedState::default(), ts, &mut |p| {
            if let Payload::DesiredHeading(h) = p {
                heading = Some(h.value);
            }
        });

        heading.expect("no heading emitted")
    }

    #[test]
    fn test_on_track_steers_along_bearing() {
        let ts = TrackingState {
            track_bearing: 0.3,
            ..Default::default()
        };

        assert!((step_heading(&ts) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_cross_track_error_steers_back() {
        // Off the track to the right (positive y): steer left of the
        // bearing
        let ts = TrackingState {
            track_bearing: 0.0,
            track_pos: nalgebra::Vector3::new(0.0, 5.0, 0.0),
            ..Default::default()
        };
        assert!(step_heading(&ts) < 0.0);

        // And symmetrically
        let ts = TrackingState {
            track_bearing: 0.0,
            track_pos: nalgebra::Vector3::new(0.0, -5.0, 0.0),
            ..Default::default()
        };
        assert!(step_heading(&ts) > 0.0);
    }
}
