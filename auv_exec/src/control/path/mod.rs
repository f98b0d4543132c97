//! # Path controller
//!
//! Accepts [`DesiredPath`] references, produces lower-level course, depth/
//! altitude and speed references, monitors along- and cross-track
//! divergence, and reports [`PathControlState`] at a configured rate.
//!
//! The controller owns the reference intake, track geometry and monitoring;
//! the steering law itself is a [`Steering`] implementation consumed
//! through the seam in [`steering`]. When bottom tracking is enabled the
//! controller feeds its vertical references through the nested
//! [`BottomTracker`], which may override them while terrain is dangerous.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod params;
pub mod state;
pub mod steering;

pub use params::Params;
pub use state::{AlongTrackMonitor, CrossTrackMonitor, TrackingState};
pub use steering::{LosSteering, Steering};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, error, info};
use nalgebra::Vector3;

use bus_if::bus::PublishFlags;
use bus_if::msg::{
    vehicle::EntityHealth, Brake, BrakeOp, ControlLoopMask, ControlLoops, DesiredPath,
    DesiredPathFlags, DesiredSpeed, DesiredZ, Distance, EstimatedState, Message, MessageId,
    NavigationUncertainty, PathControlState, PathCtrlFlags, Payload, ZUnits,
};
use util::maths;

use crate::config::{ChangedParams, ParamError, TaskSection};
use crate::control::bottom::{BottomTracker, BtArgs, BtError, EntityDispatcher};
use crate::task::{Execution, Task, TaskCtx, TaskError};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Estimated time of arrival factor.
const TIME_FACTOR: f64 = 5.0;

/// Timeout for a new incoming path reference once nearby.
///
/// Units: seconds
const NEW_REF_TIMEOUT_S: f64 = 5.0;

/// Loiter size factor used to decide if the vehicle is inside the circle.
const LOITER_SIZE_FACTOR: f64 = 0.75;

/// Distance tolerance to the loiter center.
///
/// Units: meters
const LOITER_DISTANCE_M: f64 = 1.0;

/// Hysteresis on reusing the previous path end as the new start.
///
/// Units: seconds
const PREV_END_REUSE_S: f64 = 1.0;

/// Synthetic track length used while loitering.
///
/// Units: meters
const LOITER_TRACK_LENGTH_M: f64 = 500.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The path controller task.
pub struct PathControl {
    ctx: TaskCtx,
    params: Params,

    /// Derived control and report periods.
    ///
    /// Units: seconds
    cperiod: f64,
    speriod: f64,

    steering: Box<dyn Steering>,
    btrack: Option<BottomTracker>,

    /// Entity reserved for the bottom tracker.
    bt_entity: u8,

    estate: EstimatedState,

    /// True until the first position estimate arrives.
    setup: bool,

    ts: TrackingState,
    pcs: PathControlState,

    tracking: bool,
    error: bool,
    braking: bool,
    running_monitors: bool,

    atm: AlongTrackMonitor,
    ctm: CrossTrackMonitor,

    /// Loops this controller believes are active, from observed
    /// [`ControlLoops`] traffic.
    aloops: ControlLoopMask,

    zref: DesiredZ,
    speed_ref: DesiredSpeed,

    last_pcs_report: f64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl PathControl {
    pub fn new(ctx: TaskCtx, steering: Box<dyn Steering>) -> Self {
        Self {
            ctx,
            params: Params::default(),
            cperiod: 0.1,
            speriod: 1.0,
            steering,
            btrack: None,
            bt_entity: bus_if::msg::ENT_NONE,
            estate: EstimatedState::default(),
            setup: true,
            ts: TrackingState::default(),
            pcs: PathControlState::default(),
            tracking: false,
            error: false,
            braking: false,
            running_monitors: true,
            atm: AlongTrackMonitor::default(),
            ctm: CrossTrackMonitor::default(),
            aloops: ControlLoopMask::NONE,
            zref: DesiredZ {
                value: 0.0,
                z_units: ZUnits::None,
            },
            speed_ref: DesiredSpeed {
                value: 0.0,
                speed_units: bus_if::msg::SpeedUnits::MetersPs,
            },
            last_pcs_report: f64::MIN,
        }
    }

    /// Current tracking state, for inspection by tests and telemetry.
    pub fn tracking_state(&self) -> &TrackingState {
        &self.ts
    }

    pub fn bottom_tracker(&self) -> Option<&BottomTracker> {
        self.btrack.as_ref()
    }

    pub fn in_error(&self) -> bool {
        self.error
    }

    // ---- ENTITY STATE ----

    fn update_entity_state(&mut self, msg: &str) {
        if self.setup {
            self.ctx.set_entity_state(
                EntityHealth::Boot,
                "waiting for position estimate from navigation",
            );
        } else if self.error {
            self.ctx.set_entity_state(EntityHealth::Error, msg);
        } else {
            self.ctx.set_entity_state(EntityHealth::Normal, "active");
        }
    }

    fn signal_error(&mut self, msg: &str) {
        self.error = true;
        error!("{}", msg);
        self.update_entity_state(msg);
    }

    // ---- CONTROL LOOP BOOKKEEPING ----

    fn configure_control_loops(&mut self, enable: bool, mask: ControlLoopMask) {
        if enable {
            // Already fully enabled
            if self.aloops.contains(mask) {
                return;
            }
            self.aloops.insert(mask);
        } else {
            // Already fully disabled
            if !self.aloops.intersects(mask) {
                return;
            }
            self.aloops.remove(mask);
        }

        self.ctx
            .dispatch(Payload::ControlLoops(ControlLoops { enable, mask }));
    }

    fn enable_control_loops(&mut self, mask: ControlLoopMask) {
        self.configure_control_loops(true, mask);
    }

    fn disable_control_loops(&mut self, mask: ControlLoopMask) {
        self.configure_control_loops(false, mask);
    }

    // ---- DESIRED PATH INTAKE ----

    fn consume_desired_path(&mut self, dpath: &DesiredPath) {
        if !self.is_active() {
            error!("desired path rejected: path controller not active");
            return;
        }

        let now = self.ctx.clock.now();
        self.pcs.flags = PathCtrlFlags::default();

        // Start point rule: explicit start, current position, or the
        // previous end when chaining references
        if dpath.flags.contains(DesiredPathFlags::START) {
            self.pcs.start_lat = dpath.start_lat;
            self.pcs.start_lon = dpath.start_lon;
            self.pcs.start_z = dpath.start_z;
            self.pcs.start_z_units = dpath.start_z_units;
        } else if (!self.tracking && now - self.ts.end_time > PREV_END_REUSE_S)
            || (!self.ts.nearby && !self.ts.loitering)
            || dpath.flags.contains(DesiredPathFlags::DIRECT)
        {
            let (lat, lon) = self.vehicle_wgs84();
            self.pcs.start_lat = lat;
            self.pcs.start_lon = lon;
            self.pcs.start_z = self.estate.z;
            self.pcs.start_z_units = ZUnits::Depth;
        } else {
            self.pcs.start_lat = self.pcs.end_lat;
            self.pcs.start_lon = self.pcs.end_lon;
            self.pcs.start_z = self.pcs.end_z;
            self.pcs.start_z_units = self.pcs.end_z_units;
        }

        let (n, e) = maths::wgs84_displacement(
            self.estate.lat,
            self.estate.lon,
            self.pcs.start_lat,
            self.pcs.start_lon,
        );
        self.ts.start = Vector3::new(n, e, self.pcs.start_z);

        // End point rule
        if dpath.flags.contains(DesiredPathFlags::LOITER_CURR) && dpath.lradius > 0.0 {
            let (lat, lon) = self.vehicle_wgs84();
            self.pcs.end_lat = lat;
            self.pcs.end_lon = lon;
        } else {
            self.pcs.end_lat = dpath.end_lat;
            self.pcs.end_lon = dpath.end_lon;
        }
        self.pcs.end_z = dpath.end_z;
        self.pcs.end_z_units = dpath.end_z_units;

        let (n, e) = maths::wgs84_displacement(
            self.estate.lat,
            self.estate.lon,
            self.pcs.end_lat,
            self.pcs.end_lon,
        );
        self.ts.end = Vector3::new(n, e, self.pcs.end_z);

        let (bearing, length) = maths::bearing_and_range(&self.ts.start, &self.ts.end);
        self.ts.track_bearing = bearing;
        self.ts.track_length = length;

        self.ts.start_time = now;
        self.ts.end_time = -1.0;
        self.ts.now = now;
        self.ts.delta = 0.0;
        self.tracking = true;

        // Vertical reference, unless NO_Z or the steering law handles
        // depth/altitude itself
        if !self.steering.has_specific_z_control()
            && !dpath.flags.contains(DesiredPathFlags::NO_Z)
        {
            self.ts.z_control = true;
            self.ts.z_units = dpath.end_z_units;

            match dpath.end_z_units {
                ZUnits::Altitude => {
                    self.disable_control_loops(ControlLoopMask::DEPTH);
                    self.enable_control_loops(ControlLoopMask::ALTITUDE);
                }
                ZUnits::Depth => {
                    self.disable_control_loops(ControlLoopMask::ALTITUDE);
                    self.enable_control_loops(ControlLoopMask::DEPTH);
                }
                _ => (),
            }

            self.zref = DesiredZ {
                value: dpath.end_z,
                z_units: dpath.end_z_units,
            };

            match self.btrack {
                Some(ref mut bt) => bt.on_desired_z(&self.zref, true),
                None => self.ctx.dispatch(Payload::DesiredZ(self.zref.clone())),
            }
        } else {
            self.ts.z_control = false;
            self.pcs.flags.insert(PathCtrlFlags::NO_Z);
        }

        // Speed reference; loop-back so the bottom tracker observes it
        self.speed_ref = DesiredSpeed {
            value: dpath.speed,
            speed_units: dpath.speed_units,
        };

        self.enable_control_loops(ControlLoopMask::SPEED);
        self.ctx.dispatch_flags(
            Payload::DesiredSpeed(self.speed_ref.clone()),
            PublishFlags::LOOP_BACK,
        );

        // Loiter geometry
        self.ts.loitering = false;
        self.ts.nearby = false;
        self.ts.loiter.radius = dpath.lradius;
        self.ts.loiter.clockwise = !dpath.flags.contains(DesiredPathFlags::CCLOCKW);

        if self.ts.loiter.radius > 0.0 {
            self.ts.loiter.center = self.ts.end;

            let course_err =
                maths::normalize_rad(self.estate.psi - self.ts.track_bearing).abs();

            if self.ts.track_length < LOITER_DISTANCE_M {
                // Very close to the loiter center: use the current heading
                // to avoid the bearing singularity
                self.ts.end = maths::set_bearing_and_range(
                    &self.ts.loiter.center,
                    self.estate.psi,
                    self.ts.loiter.radius,
                );
            } else {
                // Offset the end sideways onto the circle; the side depends
                // on the turn direction and whether we are already inside
                // the circle turned inwards
                let inside = self.ts.track_length
                    <= self.ts.loiter.radius * LOITER_SIZE_FACTOR
                    && course_err < std::f64::consts::FRAC_PI_2;

                let sign = if inside {
                    if self.ts.loiter.clockwise {
                        1.0
                    } else {
                        -1.0
                    }
                } else if self.ts.loiter.clockwise {
                    -1.0
                } else {
                    1.0
                };

                self.ts.end = maths::set_bearing_and_range(
                    &self.ts.loiter.center,
                    self.ts.track_bearing + sign * std::f64::consts::FRAC_PI_2,
                    self.ts.loiter.radius,
                );
            }

            let (bearing, length) = maths::bearing_and_range(&self.ts.start, &self.ts.end);
            self.ts.track_bearing = bearing;
            self.ts.track_length = length;
        }

        self.update_tracking_state();
        self.report_path_control_state(true);
        self.update_entity_state("");

        info!(
            "path (lat/lon): {:.5} {:.5} to {:.5} {:.5}",
            self.pcs.start_lat, self.pcs.start_lon, self.pcs.end_lat, self.pcs.end_lon
        );

        if self.atm.enabled {
            self.atm.diverging = false;
            self.atm.time = self.ts.now + self.atm.period;
            self.atm.last_err = self.ts.track_pos.x;
            self.atm.last_course_err = self.ts.course_error.abs();
        }

        if self.ctm.enabled {
            self.ctm.diverging = false;
        }

        let Self {
            ref mut steering,
            ref ctx,
            ref estate,
            ref ts,
            ..
        } = *self;
        steering.on_path_startup(estate, ts, &mut |p| ctx.dispatch(p));
    }

    /// Current vehicle position as WGS-84 coordinates.
    fn vehicle_wgs84(&self) -> (f64, f64) {
        maths::wgs84_displace(self.estate.lat, self.estate.lon, self.estate.x, self.estate.y)
    }

    // ---- STATE ESTIMATE PROCESSING ----

    fn consume_estimated_state(&mut self, es: &EstimatedState) {
        if let Some(ref mut bt) = self.btrack {
            if let Err(e) = bt.on_estimated_state(es) {
                self.handle_bt_error(e);
                return;
            }
        }

        if self.setup {
            self.setup = false;
            self.update_entity_state("");
        }

        // Detect a change of the LLH reference origin
        let change_ref = es.lat != self.estate.lat
            || es.lon != self.estate.lon
            || es.height != self.estate.height;

        self.estate = es.clone();

        if !self.is_active() || self.error || !self.tracking {
            return;
        }

        // Re-project the track into the new local frame
        if change_ref {
            let (n, e) = maths::wgs84_displacement(
                es.lat,
                es.lon,
                self.pcs.start_lat,
                self.pcs.start_lon,
            );
            self.ts.start.x = n;
            self.ts.start.y = e;

            let (n, e) =
                maths::wgs84_displacement(es.lat, es.lon, self.pcs.end_lat, self.pcs.end_lon);
            self.ts.end.x = n;
            self.ts.end.y = e;
        }

        let now = self.ctx.clock.now();

        // Run at most at the control frequency
        if now < self.ts.now + self.cperiod {
            return;
        }

        self.ts.delta = now - self.ts.now;
        self.ts.now = now;

        // A fresh reference must arrive within the timeout once nearby
        if self.ts.nearby && self.ts.now - self.ts.end_time >= NEW_REF_TIMEOUT_S {
            self.signal_error("expected new path control reference");
            return;
        }

        let prev_nearby = self.ts.nearby;

        self.update_tracking_state();

        self.report_path_control_state(!prev_nearby && self.ts.nearby);

        {
            let Self {
                ref mut steering,
                ref ctx,
                ref estate,
                ref ts,
                ..
            } = *self;

            if !ts.loitering {
                steering.step(estate, ts, &mut |p| ctx.dispatch(p));
            } else {
                Self::loiter_step(steering.as_mut(), estate, ts, &mut |p| ctx.dispatch(p));
            }
        }

        // Monitors are suspended while braking and re-armed afterwards
        if self.braking {
            self.running_monitors = false;
        } else {
            if !self.running_monitors {
                if self.atm.enabled && !self.ts.loitering {
                    self.atm.diverging = false;
                    self.atm.time = self.ts.now + self.atm.period;
                    self.atm.last_err = self.ts.track_pos.x;
                    self.atm.last_course_err = self.ts.course_error.abs();
                }

                if self.ctm.enabled {
                    self.ctm.diverging = false;
                }
            }

            self.running_monitors = true;
        }

        if self.running_monitors {
            if self.atm.enabled && !self.ts.loitering {
                self.monitor_along_track();
            }

            if self.ctm.enabled {
                self.monitor_cross_track();
            }
        }

        // Switch into loitering when arriving at a loiter path's endpoint
        if !self.ts.loitering && self.ts.nearby && self.ts.loiter.radius > 0.0 {
            self.ts.end = self.ts.loiter.center;
            self.ts.loitering = true;
            self.ts.nearby = false;
            info!("now loitering");
        }
    }

    fn update_tracking_state(&mut self) {
        let pos = Vector3::new(self.estate.x, self.estate.y, self.estate.z);

        let (los, range) = maths::bearing_and_range(&pos, &self.ts.end);
        self.ts.los_angle = los;
        self.ts.range = range;

        // Ground course and speed
        if self.ts.course_control {
            self.ts.course = self.estate.vy.atan2(self.estate.vx);
            self.ts.speed = maths::norm2(self.estate.vx, self.estate.vy);
        } else {
            self.ts.course = self.estate.psi;
            self.ts.speed = self.estate.u;
        }

        if !self.ts.loitering {
            // Project the position onto the track frame
            let dx = self.estate.x - self.ts.start.x;
            let dy = self.estate.y - self.ts.start.y;
            let b = self.ts.track_bearing;

            self.ts.track_pos.x = b.cos() * dx + b.sin() * dy;
            self.ts.track_pos.y = -b.sin() * dx + b.cos() * dy;

            self.ts.course_error = maths::normalize_rad(self.ts.course - self.ts.track_bearing);

            let errx = (self.ts.track_length - self.ts.track_pos.x).abs();
            let erry = self.ts.track_pos.y.abs();
            let s = self.ts.speed.max(1.0);

            let eta = if errx <= erry && erry < 2.0 * TIME_FACTOR * s {
                errx / s
            } else {
                maths::norm2(errx, erry) / s
            };

            self.ts.eta = (eta - TIME_FACTOR).min(65535.0);

            let was_nearby = self.ts.nearby;

            if !self.ts.nearby && self.ts.eta <= 0.0 {
                self.ts.eta = 0.0;
                self.ts.nearby = true;
                self.ts.end_time = self.ts.now;
            }

            if !was_nearby && self.ts.nearby {
                debug!("near endpoint");
            }
        } else {
            // Circle tracking error: signed distance off the loiter circle
            self.ts.track_pos.x = 0.0;
            self.ts.track_pos.y = self.ts.range - self.ts.loiter.radius;

            if self.ts.loiter.clockwise {
                self.ts.track_pos.y = -self.ts.track_pos.y;
            }

            let offset = if self.ts.loiter.clockwise {
                std::f64::consts::FRAC_PI_2
            } else {
                -std::f64::consts::FRAC_PI_2
            };

            self.ts.course_error =
                maths::normalize_rad(self.ts.course - self.ts.los_angle + offset);
            self.ts.eta = 0.0;
            self.ts.nearby = false;
        }

        self.ts.track_pos.z = self.estate.z - self.ts.end.z;
        self.ts.track_vel.x = self.ts.speed * self.ts.course_error.cos();
        self.ts.track_vel.y = self.ts.speed * self.ts.course_error.sin();
        self.ts.track_vel.z = self.estate.theta.sin() * self.estate.vz;
    }

    // ---- MONITORS ----

    fn monitor_along_track(&mut self) {
        if self.ts.now < self.atm.time {
            return;
        }

        let half_pi = std::f64::consts::FRAC_PI_2;

        let (curr, min_expected, progress) = if self.ts.course_error.abs() < half_pi {
            if self.atm.diverging && self.atm.last_course_err >= half_pi {
                self.atm.diverging = false;
            }

            // Use the along-track position to compute progress
            let curr = self.ts.track_pos.x;
            (
                curr,
                self.atm.period * self.atm.min_speed,
                curr - self.atm.last_err,
            )
        } else {
            // Use the course error to compute progress
            let curr = self.ts.course_error.abs();
            (
                curr,
                self.atm.period * self.atm.min_yaw,
                self.atm.last_course_err.abs() - curr,
            )
        };

        if self.atm.diverging {
            if progress >= min_expected {
                debug!(
                    "along-track monitor: {:.2} progress, no longer diverging",
                    progress
                );
                self.atm.diverging = false;
            } else {
                debug!(
                    "along-track monitor: {:.2} current, {:.2} progress, {:.2} expected, aborting",
                    curr, progress, min_expected
                );
                self.signal_error("along-track divergence error");
            }
        } else if progress < min_expected {
            debug!(
                "along-track monitor: {:.2} progress below {:.2}, diverging",
                progress, min_expected
            );
            self.atm.diverging = true;
        }

        self.atm.time += self.atm.period;
        self.atm.last_err = self.ts.track_pos.x;
        self.atm.last_course_err = self.ts.course_error.abs();
    }

    fn monitor_cross_track(&mut self) {
        let d = self.ts.track_pos.y.abs();

        if d >= self.ctm.distance_limit + self.ctm.nav_uncertainty {
            if !self.ctm.diverging {
                debug!("cross-track monitor: {:.1} m from track, diverging", d);
                self.ctm.diverging = true;
                self.ctm.divergence_started = self.ts.now;
            } else if self.ts.now - self.ctm.divergence_started >= self.ctm.time_limit {
                self.signal_error("cross-track divergence error");
            }
        } else if self.ctm.diverging {
            self.ctm.diverging = false;
            debug!("cross-track monitor: {:.1} m from track, recovered", d);
        }
    }

    // ---- REPORTING ----

    fn report_path_control_state(&mut self, force: bool) {
        if !force && self.ts.now - self.last_pcs_report < self.speriod {
            return;
        }

        self.last_pcs_report = self.ts.now;

        self.pcs.x = if self.ts.loitering {
            0.0
        } else {
            self.ts.track_length - self.ts.track_pos.x
        };
        self.pcs.y = self.ts.track_pos.y;
        self.pcs.z = self.ts.track_pos.z;
        self.pcs.vx = self.ts.track_vel.x;
        self.pcs.vy = self.ts.track_vel.y;
        self.pcs.vz = self.ts.track_vel.z;
        self.pcs.course_error = self.ts.course_error;

        if self.ts.nearby {
            self.pcs.flags.insert(PathCtrlFlags::NEAR);
        } else {
            self.pcs.flags.remove(PathCtrlFlags::NEAR);
        }

        if self.ts.loitering {
            self.pcs.flags.insert(PathCtrlFlags::LOITERING);
            self.pcs.lradius = self.ts.loiter.radius;
        } else {
            self.pcs.flags.remove(PathCtrlFlags::LOITERING);
            self.pcs.lradius = 0.0;
        }

        self.pcs.eta = self.ts.eta.round().clamp(0.0, 65535.0) as u16;

        self.ctx
            .dispatch(Payload::PathControlState(self.pcs.clone()));
    }

    // ---- LOITERING ----

    /// Synthesize a tangent track on the loiter circle and run the steering
    /// law over it.
    fn loiter_step(
        steering: &mut dyn Steering,
        state: &EstimatedState,
        ts: &TrackingState,
        emit: &mut dyn FnMut(Payload),
    ) {
        let mut lts = ts.clone();

        let mut b = std::f64::consts::PI + ts.los_angle;
        lts.start = maths::set_bearing_and_range(&ts.end, b, lts.loiter.radius);

        b += if lts.loiter.clockwise {
            std::f64::consts::FRAC_PI_2
        } else {
            -std::f64::consts::FRAC_PI_2
        };
        lts.end = maths::set_bearing_and_range(&lts.start, b, LOITER_TRACK_LENGTH_M);

        lts.track_bearing = maths::normalize_rad(b);
        lts.track_length = LOITER_TRACK_LENGTH_M;
        lts.track_pos.x = 0.0;

        let pos = Vector3::new(state.x, state.y, state.z);
        let (los, _) = maths::bearing_and_range(&pos, &lts.end);
        lts.los_angle = los;

        steering.step(state, &lts, emit);
    }

    // ---- OTHER CONSUMERS ----

    fn consume_brake(&mut self, brake: &Brake) {
        self.braking = brake.op == BrakeOp::Start;
    }

    fn consume_control_loops(&mut self, cloops: &ControlLoops) {
        if cloops.enable {
            self.aloops.insert(cloops.mask);
        } else {
            self.aloops.remove(cloops.mask);
        }

        if !cloops.mask.intersects(ControlLoopMask::PATH) {
            return;
        }

        let was = self.is_active();
        let will = cloops.enable;

        if was != will {
            self.set_active(will);
        }
    }

    fn consume_distance(&mut self, dist: &Distance) {
        if let Some(ref mut bt) = self.btrack {
            bt.on_distance(dist);
        }
    }

    fn consume_desired_z(&mut self, zref: &DesiredZ) {
        if let Some(ref mut bt) = self.btrack {
            bt.on_desired_z(zref, false);
        }
    }

    fn consume_desired_speed(&mut self, dspeed: &DesiredSpeed) {
        if let Some(ref mut bt) = self.btrack {
            bt.on_desired_speed(dspeed);
        }
    }

    fn consume_nav_uncertainty(&mut self, nu: &NavigationUncertainty) {
        self.ctm.nav_uncertainty = self.ctm.nav_unc_factor * nu.x.max(nu.y).max(0.0).sqrt();
    }

    fn handle_bt_error(&mut self, e: BtError) {
        if self.braking {
            self.ctx
                .dispatch(Payload::Brake(Brake { op: BrakeOp::Stop }));
            self.braking = false;
        }

        self.signal_error(&e.to_string());
    }
}

impl Task for PathControl {
    fn ctx(&self) -> &TaskCtx {
        &self.ctx
    }

    fn ctx_mut(&mut self) -> &mut TaskCtx {
        &mut self.ctx
    }

    fn execution(&self) -> Execution {
        Execution::Event
    }

    fn subscriptions(&self) -> Vec<MessageId> {
        let mut subs = vec![
            MessageId::BRAKE,
            MessageId::CONTROL_LOOPS,
            MessageId::DESIRED_PATH,
            MessageId::ESTIMATED_STATE,
            MessageId::DISTANCE,
            MessageId::DESIRED_Z,
            MessageId::DESIRED_SPEED,
        ];

        if self.ctm.enabled && self.ctm.nav_unc_factor > 0.0 {
            subs.push(MessageId::NAVIGATION_UNCERTAINTY);
        }

        subs
    }

    fn bind_params(&mut self, section: &TaskSection) -> Result<(), ParamError> {
        let params: Params = section.parse()?;
        params.validate()?;
        self.params = params;

        Ok(())
    }

    fn on_update_parameters(&mut self, _changed: &ChangedParams) {
        self.cperiod = 1.0 / self.params.control_frequency_hz;
        self.speriod = 1.0 / self.params.state_report_frequency_hz;

        self.ts.course_control = self.params.course_control;
        self.ts.loitering = false;
        self.ts.nearby = false;
        self.ts.end_time = self.ctx.clock.now();
        self.ts.z_control = false;

        self.atm.enabled = self.params.along_track.monitor;
        self.atm.period = self.params.along_track.check_period_s;
        self.atm.min_speed = self.params.along_track.min_speed_ms;
        self.atm.min_yaw = self.params.along_track.min_yaw_degs.to_radians();

        self.ctm.enabled = self.params.cross_track.monitor;
        self.ctm.distance_limit = self.params.cross_track.distance_limit_m;
        self.ctm.time_limit = self.params.cross_track.time_limit_s;
        self.ctm.nav_unc_factor = self.params.cross_track.nav_unc_factor;

        if !(self.ctm.enabled && self.ctm.nav_unc_factor > 0.0) {
            self.ctm.nav_uncertainty = 0.0;
        }

        self.steering.configure(&self.params);
    }

    fn on_entity_reservation(&mut self) {
        if self.params.bottom_track.enabled {
            match self.ctx.entities.reserve("Bottom Track") {
                Ok(id) => self.bt_entity = id,
                Err(e) => {
                    error!("could not reserve bottom track entity: {}", e);
                    self.bt_entity = self.ctx.entity;
                }
            }
        }
    }

    fn on_resource_acquisition(&mut self) -> Result<(), TaskError> {
        if self.params.bottom_track.enabled {
            let bp = &self.params.bottom_track;

            let args = BtArgs {
                entity: self.bt_entity,
                fsamples: bp.forward_samples,
                safe_pitch: bp.safe_pitch_deg.to_radians(),
                slope_hyst: bp.slope_hysteresis_deg.to_radians(),
                min_alt: bp.min_alt_m,
                min_range: bp.min_range_m,
                alt_tol: bp.alt_tol_m,
                depth_tol: bp.depth_tol_m,
                depth_limit: bp.depth_limit_m,
                check_trend: bp.check_trend,
                control_period: 1.0 / bp.frequency_hz,
            };

            let disp = EntityDispatcher::new(
                self.ctx.bus.clone(),
                self.ctx.clock.clone(),
                self.bt_entity,
                self.ctx.inbox.id(),
            );

            self.btrack = Some(BottomTracker::new(args, disp));
        }

        Ok(())
    }

    fn on_resource_initialization(&mut self) -> Result<(), TaskError> {
        self.set_active(false);
        self.update_entity_state("");

        Ok(())
    }

    fn on_resource_release(&mut self) {
        self.btrack = None;
    }

    fn on_activation(&mut self) {
        self.error = false;
        self.tracking = false;
        self.braking = false;
        debug!("enabling");

        self.steering.on_path_activation();
        self.update_entity_state("");

        if let Some(ref mut bt) = self.btrack {
            bt.activate();
        }
    }

    fn on_deactivation(&mut self) {
        if self.ts.z_control {
            let mask = if self.ts.z_units == ZUnits::Altitude {
                ControlLoopMask::ALTITUDE
            } else {
                ControlLoopMask::DEPTH
            };
            self.disable_control_loops(mask);
        }

        self.ts.end_time = self.ctx.clock.now();
        self.error = false;
        debug!("disabling");

        self.steering.on_path_deactivation();
        self.update_entity_state("");

        if let Some(ref mut bt) = self.btrack {
            bt.deactivate();

            if self.braking {
                self.ctx
                    .dispatch(Payload::Brake(Brake { op: BrakeOp::Stop }));
                self.braking = false;
            }
        }
    }

    fn consume(&mut self, msg: &Message) {
        match msg.payload {
            Payload::Brake(ref m) => self.consume_brake(m),
            Payload::ControlLoops(ref m) => self.consume_control_loops(m),
            Payload::DesiredPath(ref m) => self.consume_desired_path(m),
            Payload::EstimatedState(ref m) => self.consume_estimated_state(m),
            Payload::Distance(ref m) => self.consume_distance(m),
            Payload::DesiredZ(ref m) => self.consume_desired_z(m),
            Payload::DesiredSpeed(ref m) => self.consume_desired_speed(m),
            Payload::NavigationUncertainty(ref m) => self.consume_nav_uncertainty(m),
            _ => (),
        }
    }
}
