//! # Station keeping maneuver
//!
//! Holds position about a point: transit there, stop once inside the
//! radius, and re-approach whenever the vehicle drifts back out. The
//! duration countdown starts the first time the vehicle is inside the
//! radius.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info};
use serde::Deserialize;

use bus_if::msg::{
    ControlLoopMask, DesiredPath, EstimatedState, Message, MessageId, PathControlState,
    PathCtrlFlags, Payload, StationKeeping,
};
use util::maths;

use crate::config::{ParamError, TaskSection};
use crate::task::{Task, TaskCtx};

use super::{ManeuverCore, ETA_UNKNOWN};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Station keeping parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Minimum station radius, below which requests are widened to remain
    /// compatible with the path controller's arrival tolerance.
    ///
    /// Units: meters
    pub min_radius_m: f64,
}

/// The station keeping maneuver task.
pub struct StationKeepingTask {
    ctx: TaskCtx,
    core: ManeuverCore,
    params: Params,

    /// The accepted maneuver, present while one is executing.
    maneuver: Option<StationKeeping>,

    /// True while transiting towards the station point.
    moving: bool,

    /// True while within the station radius.
    inside: bool,

    /// Path controller reports the vehicle near the station point.
    near: bool,

    /// Last reported path ETA.
    ///
    /// Units: seconds
    eta: u16,

    /// Completion deadline, negative until the vehicle first gets inside.
    end_time: f64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self { min_radius_m: 10.0 }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), ParamError> {
        util::params::check_range("min_radius_m", self.min_radius_m, Some(1.0), None)?;

        Ok(())
    }
}

impl StationKeepingTask {
    pub fn new(ctx: TaskCtx, core: ManeuverCore) -> Self {
        Self {
            ctx,
            core,
            params: Params::default(),
            maneuver: None,
            moving: true,
            inside: false,
            near: false,
            eta: ETA_UNKNOWN,
            end_time: -1.0,
        }
    }

    fn start(&mut self, maneuver: &StationKeeping) {
        if !self.core.acquire(&self.ctx) {
            return;
        }

        self.set_active(true);
        self.core.set_control(&self.ctx, ControlLoopMask::PATH);

        let mut maneuver = maneuver.clone();

        if maneuver.radius < self.params.min_radius_m {
            info!(
                "station radius widened from {:.1} to {:.1} m",
                maneuver.radius, self.params.min_radius_m
            );
            maneuver.radius = self.params.min_radius_m;
        }

        self.moving = true;
        self.inside = false;
        self.near = false;
        self.eta = ETA_UNKNOWN;
        self.end_time = -1.0;

        self.dispatch_path(&maneuver);
        self.maneuver = Some(maneuver);
    }

    /// Command a path to the station point.
    fn dispatch_path(&self, maneuver: &StationKeeping) {
        self.ctx.dispatch(Payload::DesiredPath(DesiredPath {
            end_lat: maneuver.lat,
            end_lon: maneuver.lon,
            end_z: maneuver.z,
            end_z_units: maneuver.z_units,
            speed: maneuver.speed,
            speed_units: maneuver.speed_units,
            lradius: 0.0,
            ..Default::default()
        }));
    }

    fn on_estimated_state(&mut self, state: &EstimatedState) {
        if !self.is_active() {
            return;
        }

        let maneuver = match self.maneuver {
            Some(ref m) => m.clone(),
            None => return,
        };

        // Horizontal distance from the vehicle to the station point
        let (n, e) = maths::wgs84_displacement(state.lat, state.lon, maneuver.lat, maneuver.lon);
        let dist = maths::norm2(n - state.x, e - state.y);

        self.inside = dist <= maneuver.radius;

        // Arm the duration countdown the first time we are inside
        if self.inside && maneuver.duration > 0 && self.end_time < 0.0 {
            self.end_time = self.ctx.clock.now() + maneuver.duration as f64;
            info!("inside station radius, keeping for {} s", maneuver.duration);
        }

        if self.moving && self.near {
            debug!("arrived at station point, holding");
            self.moving = false;
        } else if !self.moving && dist > maneuver.radius {
            debug!("drifted {:.1} m from station point, re-approaching", dist);
            self.moving = true;
            self.near = false;
            self.dispatch_path(&maneuver);
        }
    }

    fn on_path_control_state(&mut self, pcs: &PathControlState) {
        if !self.is_active() {
            return;
        }

        self.eta = pcs.eta;
        self.near = pcs.flags.contains(PathCtrlFlags::NEAR);
    }
}

impl Task for StationKeepingTask {
    fn ctx(&self) -> &TaskCtx {
        &self.ctx
    }

    fn ctx_mut(&mut self) -> &mut TaskCtx {
        &mut self.ctx
    }

    fn subscriptions(&self) -> Vec<MessageId> {
        vec![
            MessageId::STATION_KEEPING,
            MessageId::STOP_MANEUVER,
            MessageId::ESTIMATED_STATE,
            MessageId::PATH_CONTROL_STATE,
        ]
    }

    fn bind_params(&mut self, section: &TaskSection) -> Result<(), ParamError> {
        let params: Params = section.parse()?;
        params.validate()?;
        self.params = params;

        Ok(())
    }

    fn on_deactivation(&mut self) {
        self.maneuver = None;
        self.core.release(&self.ctx);
    }

    fn consume(&mut self, msg: &Message) {
        match msg.payload {
            Payload::StationKeeping(ref m) => self.start(m),
            Payload::StopManeuver => {
                if self.is_active() {
                    self.set_active(false);
                }
            }
            Payload::EstimatedState(ref m) => self.on_estimated_state(m),
            Payload::PathControlState(ref m) => self.on_path_control_state(m),
            _ => (),
        }
    }

    fn on_report(&mut self) {
        if !self.is_active() {
            return;
        }

        if self.end_time > 0.0 {
            let time_left = self.end_time - self.ctx.clock.now();

            if time_left <= 0.0 {
                self.set_active(false);
                self.core.signal_completion(&self.ctx, "station keeping complete");
            } else {
                self.core
                    .signal_progress(&self.ctx, time_left.round() as u16, "keeping station");
            }
        } else if self.moving {
            self.core.signal_progress(&self.ctx, self.eta, "");
        }
    }
}
