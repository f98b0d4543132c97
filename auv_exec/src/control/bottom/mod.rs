//! # Bottom tracker
//!
//! Nested sub-machine of the path controller protecting the vehicle from
//! terrain while following an altitude reference. States: Idle, Tracking,
//! Depth, Unsafe, Avoiding.
//!
//! The tracker never holds a reference back to its owner: it dispatches
//! through an [`EntityDispatcher`] handle carrying the bus and its own
//! entity identity, and surfaces unrecoverable conditions as [`BtError`]
//! for the owner to handle.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod slope;

pub use slope::SlopeData;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::fmt;
use std::sync::Arc;

use log::debug;
use thiserror::Error;

use bus_if::bus::{Bus, InboxId, PublishFlags};
use bus_if::msg::{
    Brake, BrakeOp, DesiredSpeed, DesiredZ, Distance, EstimatedState, Message, Payload, ZUnits,
};
use util::time::Clock;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Depth hysteresis for ignoring ranges and altitude.
///
/// Units: meters
const DEPTH_HYST_M: f64 = 0.5;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Dispatch handle with a fixed source entity, used by sub-components that
/// publish on behalf of their owning task.
pub struct EntityDispatcher {
    bus: Bus,
    clock: Arc<Clock>,
    entity: u8,
    origin: InboxId,
}

/// Bottom tracker arguments, derived from the path controller's parameter
/// section during resource acquisition.
#[derive(Debug, Clone)]
pub struct BtArgs {
    /// Entity id reserved for the tracker.
    pub entity: u8,

    /// Number of samples in the forward range moving average.
    pub fsamples: usize,

    /// Units: radians
    pub safe_pitch: f64,
    pub slope_hyst: f64,

    /// Units: meters
    pub min_alt: f64,
    pub min_range: f64,
    pub alt_tol: f64,
    pub depth_tol: f64,
    pub depth_limit: f64,

    /// Check the slope angle trend in the unsafe state.
    pub check_trend: bool,

    /// Minimum interval between state machine evaluations.
    ///
    /// Units: seconds
    pub control_period: f64,
}

/// The bottom tracker state machine.
pub struct BottomTracker {
    args: BtArgs,
    disp: EntityDispatcher,

    active: bool,
    mstate: BtState,
    sdata: SlopeData,

    estate: EstimatedState,
    got_data: bool,

    /// Vertical reference last commanded by the upper layer.
    z_ref: DesiredZ,

    forced: ForcedControl,

    /// Desired speed last commanded by the upper layer.
    ///
    /// Units: meters/second
    dspeed: f64,

    /// Time of the last state machine evaluation.
    last_run: f64,

    valid_alt: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Bottom tracker states.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BtState {
    Idle,
    Tracking,
    Depth,
    Unsafe,
    Avoiding,
}

/// Reason depth control is being forced.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ForcedControl {
    None,
    Depth,
}

/// Unrecoverable tracker conditions, handled by the owning controller.
#[derive(Debug, Error)]
#[error("[BottomTracker.{state}] {msg}")]
pub struct BtError {
    pub state: BtState,
    pub msg: String,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl fmt::Display for BtState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BtState::Idle => "Idle",
            BtState::Tracking => "Tracking",
            BtState::Depth => "Depth",
            BtState::Unsafe => "Unsafe",
            BtState::Avoiding => "Avoiding",
        };
        write!(f, "{}", s)
    }
}

impl EntityDispatcher {
    pub fn new(bus: Bus, clock: Arc<Clock>, entity: u8, origin: InboxId) -> Self {
        Self {
            bus,
            clock,
            entity,
            origin,
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    fn dispatch(&self, payload: Payload) {
        self.dispatch_flags(payload, PublishFlags::NONE);
    }

    fn dispatch_flags(&self, payload: Payload, flags: PublishFlags) {
        let mut msg = Message::new(payload);
        msg.header.src_ent = self.entity;

        self.bus
            .publish(msg, flags, self.clock.since_epoch(), Some(self.origin));
    }
}

impl BottomTracker {
    pub fn new(args: BtArgs, disp: EntityDispatcher) -> Self {
        let sdata = SlopeData::new(
            args.fsamples,
            args.min_range,
            args.safe_pitch,
            args.slope_hyst,
        );
        let last_run = disp.clock.now();

        let mut tracker = Self {
            args,
            disp,
            active: false,
            mstate: BtState::Idle,
            sdata,
            estate: EstimatedState::default(),
            got_data: false,
            z_ref: DesiredZ {
                value: 0.0,
                z_units: ZUnits::None,
            },
            forced: ForcedControl::None,
            dspeed: 0.0,
            last_run,
            valid_alt: false,
        };

        tracker.reset();
        tracker
    }

    pub fn state(&self) -> BtState {
        self.mstate
    }

    fn reset(&mut self) {
        self.sdata.reset();
        self.mstate = BtState::Idle;
        self.got_data = false;
        self.z_ref = DesiredZ {
            value: 0.0,
            z_units: ZUnits::None,
        };
        self.forced = ForcedControl::None;
        self.dspeed = 0.0;
        self.last_run = self.disp.clock.now();
    }

    pub fn activate(&mut self) {
        self.active = true;
        self.reset();
        self.debug("enabling");
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        self.debug("disabling");
    }

    /// Feed a forward range measurement.
    pub fn on_distance(&mut self, msg: &Distance) {
        self.sdata.on_distance(msg, &self.estate);
    }

    /// Feed a vertical reference. `outgoing` marks references originated by
    /// the owning controller, which the tracker may withhold from the bus
    /// while it is overriding them; incoming references are only recorded.
    pub fn on_desired_z(&mut self, msg: &DesiredZ, outgoing: bool) {
        let mut tobus = false;

        if self.active {
            self.z_ref = msg.clone();

            if outgoing {
                tobus = !matches!(self.mstate, BtState::Unsafe | BtState::Avoiding);

                if self.forced != ForcedControl::None {
                    tobus = false;
                }
            }
        } else if outgoing {
            tobus = true;
        }

        if tobus {
            self.disp.dispatch(Payload::DesiredZ(msg.clone()));
        }
    }

    /// Feed a speed reference.
    pub fn on_desired_speed(&mut self, msg: &DesiredSpeed) {
        if !self.active {
            return;
        }

        self.dspeed = msg.value;
    }

    /// Feed a state estimate, evaluating the state machine at most once per
    /// control period. May dispatch references only while active.
    pub fn on_estimated_state(&mut self, msg: &EstimatedState) -> Result<(), BtError> {
        if !self.active {
            return Ok(());
        }

        self.estate = msg.clone();

        let now = self.disp.clock.now();
        if now - self.last_run > self.args.control_period {
            self.update_state_machine()?;
            self.last_run = now;
        }

        Ok(())
    }

    fn update_state_machine(&mut self) -> Result<(), BtError> {
        if !self.got_data {
            // Hold off until there is a usable vertical and speed reference
            if self.z_ref.z_units == ZUnits::None {
                return Ok(());
            }

            if self.dspeed <= 0.0 {
                return Ok(());
            }
        }

        self.got_data = true;

        match self.mstate {
            BtState::Idle => self.on_idle(),
            BtState::Tracking => self.on_tracking(),
            BtState::Depth => self.on_depth(),
            BtState::Unsafe => self.on_unsafe(),
            BtState::Avoiding => self.on_avoiding(),
        }
    }

    fn on_idle(&mut self) -> Result<(), BtError> {
        if self.z_ref.z_units == ZUnits::Altitude {
            self.debug("units are now altitude, moving to tracking");

            self.mstate = BtState::Tracking;
            self.valid_alt = self.estate.depth > self.args.depth_tol;
        }

        Ok(())
    }

    fn on_tracking(&mut self) -> Result<(), BtError> {
        self.sdata.render_slope_invalid();

        // The upper layer went back to depth references
        if self.z_ref.z_units == ZUnits::Depth {
            self.debug("units are depth now, moving to idle");

            self.mstate = BtState::Idle;
            return Ok(());
        }

        // Do not attempt to interfere if we cannot use altitude
        if !self.is_altitude_valid() {
            return Ok(());
        }

        if self.estate.alt < self.args.min_alt {
            self.debug(&format!(
                "altitude is too low: {:.2}, stopping motor",
                self.estate.alt
            ));

            self.brake(true);
            self.mstate = BtState::Avoiding;
            return Ok(());
        }

        // Do not attempt to interfere if the echo can be the surface
        if self.sdata.is_surface(&self.estate) {
            return Ok(());
        }

        if self.sdata.is_range_low() {
            self.debug(&format!(
                "forward range is too low: {:.2}, stopping motor",
                self.sdata.frange()
            ));

            self.brake(true);
            self.mstate = BtState::Avoiding;
            return Ok(());
        }

        if self.sdata.is_too_steep() {
            self.debug(&format!(
                "slope is too steep: {:.2} > {:.2}",
                self.sdata.slope(),
                self.args.safe_pitch
            ));

            self.sdata.update_slope_top(&self.estate);
            self.dispatch_safe_depth();
            self.mstate = BtState::Unsafe;
            return Ok(());
        }

        // Reaching a limit in depth
        if self.estate.depth + self.estate.alt - self.z_ref.value
            > self.args.depth_limit + DEPTH_HYST_M
        {
            self.debug("depth is reaching unacceptable values, forcing depth control");

            self.forced = ForcedControl::Depth;
            self.dispatch_limit_depth();
            self.mstate = BtState::Depth;
        }

        Ok(())
    }

    fn on_depth(&mut self) -> Result<(), BtError> {
        if self.z_ref.z_units == ZUnits::Altitude && self.forced != ForcedControl::Depth {
            self.debug("units are altitude now, moving to altitude control");

            self.forced = ForcedControl::None;
            self.dispatch_same_z();
            self.mstate = BtState::Tracking;
            return Ok(());
        }

        if self.z_ref.z_units == ZUnits::Depth && self.z_ref.value < self.args.depth_limit {
            self.debug("units are depth now, moving to idle");

            self.forced = ForcedControl::None;
            self.mstate = BtState::Idle;
            self.dispatch_same_z();
            return Ok(());
        }

        if self.sdata.is_range_low() {
            self.debug(&format!(
                "forward range is too low: {:.2}, stopping motor",
                self.sdata.frange()
            ));

            self.forced = ForcedControl::None;
            self.brake(true);
            self.mstate = BtState::Avoiding;
            return Ok(());
        }

        if self.forced == ForcedControl::Depth
            && self.estate.depth + self.estate.alt - self.z_ref.value < self.args.depth_limit
        {
            self.debug("depth is no longer near the limit");

            self.forced = ForcedControl::None;
            self.dispatch_same_z();
            self.mstate = BtState::Tracking;
        }

        Ok(())
    }

    fn on_unsafe(&mut self) -> Result<(), BtError> {
        self.sdata.update_slope_top(&self.estate);

        let away_top = self.sdata.is_top_cleared(&self.estate);

        if !self.is_altitude_valid() {
            if away_top {
                self.debug("cannot use altitude and the slope top is cleared, tracking");

                self.dispatch_same_z();
                self.mstate = BtState::Tracking;
                self.sdata.render_slope_invalid();
            }

            return Ok(());
        }

        if self.estate.alt < self.args.min_alt || self.sdata.is_range_low() {
            if self.estate.alt < self.args.min_alt {
                self.debug(&format!(
                    "altitude is too low: {:.2}, stopping motor",
                    self.estate.alt
                ));
            } else {
                self.debug(&format!(
                    "forward range is too low: {:.2}, stopping motor",
                    self.sdata.frange()
                ));
            }

            self.brake(true);
            self.mstate = BtState::Avoiding;
            return Ok(());
        }

        if self.sdata.is_surface(&self.estate) {
            self.debug("cannot use range, tracking");

            self.dispatch_same_z();
            self.mstate = BtState::Tracking;
            return Ok(());
        }

        if !self.sdata.is_too_steep() {
            if away_top {
                self.debug("slope top cleared, moving back to tracking");

                // Re-dispatch the reference sent by the upper layer
                self.dispatch_same_z();
                self.mstate = BtState::Tracking;
                self.sdata.render_slope_invalid();
            }
        } else if self.sdata.is_slope_increasing()
            && (self.args.check_trend || self.estate.theta < 0.0)
        {
            self.debug(&format!(
                "slope is becoming steeper: {:.2}",
                self.sdata.slope()
            ));

            self.dispatch_safe_depth();
        }

        Ok(())
    }

    fn on_avoiding(&mut self) -> Result<(), BtError> {
        // If ranges or altitude cannot be used we are clueless
        if self.sdata.is_surface(&self.estate) || !self.is_altitude_valid() {
            return Err(self.error("unable to avoid obstacle"));
        }

        // Buoyancy has pulled the vehicle up to the reference and the slope
        // is safe again
        if !self.sdata.is_too_steep()
            && self.z_ref.z_units == ZUnits::Altitude
            && self.estate.alt >= self.z_ref.value
        {
            self.debug("above altitude reference and slope is safe");

            self.brake(false);
            self.dispatch_same_z();
            self.mstate = BtState::Tracking;
        }

        Ok(())
    }

    fn brake(&self, start: bool) {
        let op = if start { BrakeOp::Start } else { BrakeOp::Stop };
        self.disp
            .dispatch_flags(Payload::Brake(Brake { op }), PublishFlags::LOOP_BACK);

        if start {
            self.debug("started braking");
        } else {
            self.debug("stopped braking");
        }
    }

    /// Dispatch a depth reference that keeps the vehicle clear of the slope
    /// top: depth at the top minus the altitude reference, clamped at the
    /// surface.
    fn dispatch_safe_depth(&self) {
        let depth_at_slope = self.sdata.slope_top_depth(&self.estate);

        let value = if self.z_ref.z_units == ZUnits::Altitude {
            (depth_at_slope - self.z_ref.value).max(0.0)
        } else {
            (depth_at_slope - self.args.alt_tol).max(0.0)
        };

        self.disp.dispatch(Payload::DesiredZ(DesiredZ {
            value,
            z_units: ZUnits::Depth,
        }));

        self.debug(&format!("dispatching new depth: {:.2}", value));
    }

    fn dispatch_limit_depth(&self) {
        self.disp.dispatch(Payload::DesiredZ(DesiredZ {
            value: self.args.depth_limit,
            z_units: ZUnits::Depth,
        }));

        self.debug(&format!(
            "dispatching limit depth: {:.2}",
            self.args.depth_limit
        ));
    }

    fn dispatch_same_z(&self) {
        self.disp.dispatch(Payload::DesiredZ(self.z_ref.clone()));

        self.debug(&format!(
            "dispatching same z ref: {:.2}",
            self.z_ref.value
        ));
    }

    /// Altitude validity with depth hysteresis: valid above `depth_tol`,
    /// invalid again below `depth_tol` minus the hysteresis.
    fn is_altitude_valid(&mut self) -> bool {
        if self.estate.alt < 0.0 {
            self.valid_alt = false;
        }

        if self.estate.depth > self.args.depth_tol {
            self.valid_alt = true;
        } else if self.estate.depth < self.args.depth_tol - DEPTH_HYST_M {
            self.valid_alt = false;
        }

        self.valid_alt
    }

    fn debug(&self, msg: &str) {
        debug!("[BottomTracker.{}] {}", self.mstate, msg);
    }

    fn error(&self, msg: &str) -> BtError {
        BtError {
            state: self.mstate,
            msg: msg.into(),
        }
    }
}
