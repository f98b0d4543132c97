//! # Vehicle supervisor
//!
//! Single source of truth for the vehicle's operating mode. The supervisor
//! arbitrates between plan maneuvers, external overrides and error
//! recovery, tracks entity health and control-loop ownership, and emits
//! [`VehicleState`] once per second and on every transition.
//!
//! Modes: Service, Calibration, Error, Maneuver, External. Command
//! requests always produce exactly one reply (Success or Failure with a
//! reason); a command arriving in an incompatible mode is refused, never an
//! illegal transition.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

pub use params::Params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, error, info, warn};

use bus_if::msg::{
    Calibration, ControlLoopMask, ControlLoops, EntityMonitoringState, IdleManeuver,
    ManeuverControlState, McsState, Message, MessageId, OpMode, Payload, PcOp, PcType,
    PlanControl, PlanControlFlags, VcCommand, VcType, VehicleCommand, VehicleState,
    VehicleStateFlags,
};

use crate::config::{ChangedParams, ParamError, TaskSection};
use crate::task::{Execution, Task, TaskCtx};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Supervisor tick frequency.
///
/// Units: Hertz
pub const TICK_FREQUENCY_HZ: f64 = 1.0;

/// Minimum interval between repeated entity-error warnings.
///
/// Units: seconds
const ERROR_WARN_PERIOD_S: f64 = 2.0;

/// Window after maneuver completion in which a new reference must arrive
/// before the supervisor falls back to service mode.
///
/// Units: seconds
const MANEUVER_TIMEOUT_S: f64 = 1.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The vehicle supervisor task.
pub struct Supervisor {
    ctx: TaskCtx,
    params: Params,

    /// The vehicle state report, also holding the authoritative mode.
    vs: VehicleState,

    /// One-shot timer shared by calibration expiry and the maneuver-done
    /// new-reference window. Negative when disarmed.
    switch_time: f64,

    /// Duration of the running calibration.
    ///
    /// Units: seconds
    calibration_duration: u16,

    /// Currently performing a plan started with IGNORE_ERRORS.
    in_safe_plan: bool,

    /// Time of the last repeated entity-error warning.
    last_error_warn: f64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Supervisor {
    pub fn new(ctx: TaskCtx) -> Self {
        Self {
            ctx,
            params: Params::default(),
            vs: VehicleState::default(),
            switch_time: -1.0,
            calibration_duration: 0,
            in_safe_plan: false,
            last_error_warn: f64::MIN,
        }
    }

    /// Immutable view of the current vehicle state report.
    pub fn vehicle_state(&self) -> &VehicleState {
        &self.vs
    }

    // ---- MODE PREDICATES ----

    fn service_mode(&self) -> bool {
        self.vs.op_mode == OpMode::Service
    }

    fn maneuver_mode(&self) -> bool {
        self.vs.op_mode == OpMode::Maneuver
    }

    fn calibration_mode(&self) -> bool {
        self.vs.op_mode == OpMode::Calibration
    }

    fn error_mode(&self) -> bool {
        self.vs.op_mode == OpMode::Error
    }

    fn external_mode(&self) -> bool {
        self.vs.op_mode == OpMode::External
    }

    fn teleoperation_on(&self) -> bool {
        self.vs.maneuver_type == MessageId::TELEOPERATION.0
    }

    /// Loops that must not be overridden by error recovery.
    fn non_overridable_loops(&self) -> bool {
        self.vs
            .control_loops
            .intersects(ControlLoopMask::TELEOPERATION.union(ControlLoopMask::NO_OVERRIDE))
    }

    /// Check whether the entities in error are relevant in the current
    /// plan context. Inside a safe plan only the configured safe entities
    /// trigger error mode.
    fn entity_error(&self) -> bool {
        if self.vs.error_count == 0 {
            return false;
        }

        if self.params.safe_entities.is_empty() || !self.in_safe_plan {
            return true;
        }

        self.vs
            .error_ents
            .split(',')
            .any(|ent| self.params.safe_entities.iter().any(|safe| safe == ent))
    }

    // ---- TRANSITIONS ----

    /// Change the operating mode, dispatching the new state. Entering
    /// service while entities are in error lands in error mode instead.
    /// When a maneuver is supplied the mode change enters maneuver mode and
    /// the cloned maneuver is published.
    fn change_mode(&mut self, mode: OpMode, maneuver: Option<Payload>) {
        let mut mode = mode;

        if self.vs.op_mode != mode {
            if mode == OpMode::Service && self.entity_error() {
                mode = OpMode::Error;
            }

            self.vs.op_mode = mode;
            warn!("now in {:?} mode", mode);

            if !self.maneuver_mode() {
                self.vs.maneuver_type = VehicleState::MANEUVER_NONE;
                self.vs.maneuver_stime = -1.0;
                self.vs.maneuver_eta = VehicleState::ETA_UNKNOWN;
                self.vs.flags.remove(VehicleStateFlags::MANEUVER_DONE);
            }
        }

        if self.maneuver_mode() {
            if let Some(m) = maneuver {
                self.vs.maneuver_type = m.id().0;
                self.vs.maneuver_stime = self.ctx.clock.since_epoch();
                self.vs.maneuver_eta = VehicleState::ETA_UNKNOWN;
                self.vs.last_error.clear();
                self.vs.last_error_time = -1.0;
                self.vs.flags.remove(VehicleStateFlags::MANEUVER_DONE);
                self.ctx.dispatch(m);
            }
        }

        self.switch_time = -1.0;
        self.dispatch_vehicle_state();
    }

    /// Stop any running maneuver, disable all control loops and command the
    /// idle maneuver.
    fn reset(&mut self) {
        if self.maneuver_mode() {
            self.ctx.dispatch(Payload::StopManeuver);
        }

        self.in_safe_plan = false;
        self.last_error_warn = f64::MIN;
        self.vs.control_loops = ControlLoopMask::NONE;

        self.ctx
            .dispatch(Payload::IdleManeuver(IdleManeuver { duration: 0 }));
    }

    fn dispatch_vehicle_state(&self) {
        self.ctx.dispatch(Payload::VehicleState(self.vs.clone()));
    }

    // ---- COMMAND HANDLING ----

    fn answer(&self, cmd: &VehicleCommand, reply_type: VcType, desc: &str) {
        let reply = VehicleCommand::reply(cmd, reply_type, desc);

        if reply_type == VcType::Failure {
            error!("{}", desc);
        } else {
            debug!("{}", desc);
        }

        self.ctx.dispatch(Payload::VehicleCommand(reply));
    }

    fn request_ok(&self, cmd: &VehicleCommand, desc: &str) {
        self.answer(cmd, VcType::Success, desc);
    }

    fn request_failed(&self, cmd: &VehicleCommand, desc: &str) {
        self.answer(cmd, VcType::Failure, desc);
    }

    fn start_maneuver(&mut self, cmd: &VehicleCommand) {
        let maneuver = match cmd.maneuver {
            Some(ref m) => (**m).clone(),
            None => {
                self.request_failed(cmd, "no maneuver specified");
                return;
            }
        };

        let mtype = maneuver.abbrev();

        if self.external_mode() || self.error_mode() {
            self.request_failed(
                cmd,
                &format!("{} maneuver cannot be started in current mode", mtype),
            );
            return;
        }

        // A running calibration yields through service mode first
        if self.calibration_mode() {
            self.change_mode(OpMode::Service, None);

            if !self.service_mode() {
                self.request_failed(cmd, "cannot start maneuver: vehicle errors present");
                return;
            }
        }

        // Idempotent stop of whatever maneuver may be running, then publish
        // the cloned maneuver for its task to pick up
        self.ctx.dispatch(Payload::StopManeuver);
        self.change_mode(OpMode::Maneuver, Some(maneuver));

        self.request_ok(cmd, &format!("{} maneuver started", mtype));
    }

    fn stop_maneuver(&mut self, cmd: &VehicleCommand) {
        if !self.error_mode() {
            self.reset();

            if !self.external_mode() || !self.non_overridable_loops() {
                self.change_mode(OpMode::Service, None);
            }
        }

        self.request_ok(cmd, "OK");
    }

    fn start_calibration(&mut self, cmd: &VehicleCommand) {
        if self.external_mode() {
            self.request_failed(cmd, "cannot calibrate: vehicle is in external mode");
            return;
        }

        if self.error_mode() {
            self.request_failed(cmd, "cannot calibrate: vehicle is in error mode");
            return;
        }

        // A running maneuver is stopped and the vehicle passes through
        // service mode before calibration starts
        if self.maneuver_mode() {
            self.reset();
            self.change_mode(OpMode::Service, None);

            if !self.service_mode() {
                self.request_failed(cmd, "cannot calibrate: vehicle errors present");
                return;
            }
        }

        self.change_mode(OpMode::Calibration, None);

        self.calibration_duration = cmd.calib_time;
        self.ctx.dispatch(Payload::Calibration(Calibration {
            duration: cmd.calib_time,
        }));

        self.switch_time = self.ctx.clock.now();

        self.request_ok(
            cmd,
            &format!("calibrating vehicle for {} seconds", cmd.calib_time),
        );
    }

    fn stop_calibration(&mut self, cmd: &VehicleCommand) {
        if !self.calibration_mode() {
            self.request_ok(cmd, "cannot stop calibration: vehicle is not calibrating");
            return;
        }

        self.request_ok(cmd, "stopped calibration");

        debug!("calibration over");
        self.change_mode(OpMode::Service, None);
    }

    // ---- CONSUMERS ----

    fn consume_abort(&mut self) {
        self.vs.last_error = "got abort request".into();
        self.vs.last_error_time = self.ctx.clock.since_epoch();
        error!("{}", self.vs.last_error);

        if !self.error_mode() {
            self.reset();

            if !self.external_mode() || !self.non_overridable_loops() {
                self.change_mode(OpMode::Service, None);
            }
        }
    }

    fn consume_control_loops(&mut self, msg: &ControlLoops) {
        let was = self.vs.control_loops;

        if msg.enable {
            self.vs.control_loops.insert(msg.mask);

            if was.is_empty() && !self.vs.control_loops.is_empty() {
                self.on_enabled_control_loops();
            }
        } else {
            self.vs.control_loops.remove(msg.mask);

            if !was.is_empty() && self.vs.control_loops.is_empty() {
                self.on_disabled_control_loops();
            }
        }
    }

    fn on_enabled_control_loops(&mut self) {
        debug!("some control loops are enabled now");

        match self.vs.op_mode {
            OpMode::Service => self.change_mode(OpMode::External, None),
            OpMode::Error => {
                if self.non_overridable_loops() {
                    // Teleoperation style loops cannot be disabled from
                    // here, so hand the vehicle to the external controller
                    self.change_mode(OpMode::External, None);
                } else {
                    // Try to disable the loops
                    self.reset();
                }
            }
            _ => (),
        }
    }

    fn on_disabled_control_loops(&mut self) {
        debug!("no control loops are enabled now");

        if self.external_mode() {
            self.change_mode(OpMode::Service, None);
        }
    }

    fn consume_entity_monitoring(&mut self, msg: &EntityMonitoringState) {
        let prev_count = self.vs.error_count;

        self.vs.error_count = msg.ccount + msg.ecount;

        if self.vs.error_count > 0 && msg.last_error_time > self.vs.last_error_time {
            self.vs.last_error = msg.last_error.clone();
            self.vs.last_error_time = msg.last_error_time;
        }

        self.vs.error_ents.clear();
        if msg.ccount > 0 {
            self.vs.error_ents = msg.cnames.clone();
        }
        if msg.ecount > 0 {
            if msg.ccount > 0 {
                self.vs.error_ents.push(',');
            }
            self.vs.error_ents.push_str(&msg.enames);
        }

        let now = self.ctx.clock.now();

        if prev_count > 0 && self.vs.error_count == 0 {
            warn!("entity errors cleared");
        } else if prev_count != self.vs.error_count
            && now - self.last_error_warn >= ERROR_WARN_PERIOD_S
        {
            warn!("vehicle errors: {}", self.vs.error_ents);
            self.last_error_warn = now;
        }

        if self.error_mode() {
            if self.vs.error_count == 0 {
                self.change_mode(OpMode::Service, None);
            }
            return;
        }

        // External control and teleoperation are not interrupted by entity
        // errors unless the loops can be overridden
        if self.external_mode() || self.maneuver_mode() {
            if self.entity_error() && !self.non_overridable_loops() && !self.teleoperation_on() {
                self.reset();
                self.change_mode(OpMode::Error, None);
            }
            return;
        }

        if self.entity_error() && !self.calibration_mode() {
            self.reset();
            self.change_mode(OpMode::Error, None);
        }
    }

    fn consume_maneuver_state(&mut self, header_src: u16, msg: &ManeuverControlState) {
        if header_src != self.ctx.bus.system_id() {
            return;
        }

        if !self.maneuver_mode() {
            return;
        }

        match msg.state {
            McsState::Executing => {
                if msg.eta != self.vs.maneuver_eta {
                    self.vs.maneuver_eta = msg.eta;
                    self.dispatch_vehicle_state();
                }
            }
            McsState::Done => {
                debug!("maneuver done");
                self.vs.maneuver_eta = 0;
                self.vs.flags.insert(VehicleStateFlags::MANEUVER_DONE);
                self.dispatch_vehicle_state();

                // Arm the new-reference window
                self.switch_time = self.ctx.clock.now();
            }
            McsState::Error => {
                self.vs.last_error = format!("maneuver error: {}", msg.info);
                self.vs.last_error_time = self.ctx.clock.since_epoch();
                debug!("{}", self.vs.last_error);
                self.change_mode(OpMode::Service, None);
                self.reset();
            }
        }
    }

    fn consume_plan_control(&mut self, msg: &PlanControl) {
        if msg.command_type == PcType::Request && msg.op == PcOp::Start {
            self.in_safe_plan = msg.flags.contains(PlanControlFlags::IGNORE_ERRORS);
        }
    }

    fn consume_vehicle_command(&mut self, cmd: &VehicleCommand) {
        if cmd.command_type != VcType::Request {
            return;
        }

        match cmd.command {
            VcCommand::ExecManeuver => self.start_maneuver(cmd),
            VcCommand::StopManeuver => self.stop_maneuver(cmd),
            VcCommand::StartCalibration => self.start_calibration(cmd),
            VcCommand::StopCalibration => self.stop_calibration(cmd),
        }
    }
}

impl Task for Supervisor {
    fn ctx(&self) -> &TaskCtx {
        &self.ctx
    }

    fn ctx_mut(&mut self) -> &mut TaskCtx {
        &mut self.ctx
    }

    fn execution(&self) -> Execution {
        Execution::Periodic(TICK_FREQUENCY_HZ)
    }

    fn subscriptions(&self) -> Vec<MessageId> {
        vec![
            MessageId::ABORT,
            MessageId::CONTROL_LOOPS,
            MessageId::ENTITY_MONITORING_STATE,
            MessageId::MANEUVER_CONTROL_STATE,
            MessageId::VEHICLE_COMMAND,
            MessageId::PLAN_CONTROL,
        ]
    }

    fn bind_params(&mut self, section: &TaskSection) -> Result<(), ParamError> {
        let params: Params = section.parse()?;
        params.validate()?;
        self.params = params;

        Ok(())
    }

    fn on_update_parameters(&mut self, _changed: &ChangedParams) {
        info!(
            "safe-plan entity filter: {:?}",
            self.params.safe_entities
        );
    }

    fn on_resource_initialization(&mut self) -> Result<(), crate::task::TaskError> {
        self.vs = VehicleState::default();
        self.switch_time = -1.0;

        Ok(())
    }

    fn consume(&mut self, msg: &Message) {
        match msg.payload {
            Payload::Abort => self.consume_abort(),
            Payload::ControlLoops(ref m) => self.consume_control_loops(m),
            Payload::EntityMonitoringState(ref m) => self.consume_entity_monitoring(m),
            Payload::ManeuverControlState(ref m) => {
                self.consume_maneuver_state(msg.header.src_sys, m)
            }
            Payload::PlanControl(ref m) => self.consume_plan_control(m),
            Payload::VehicleCommand(ref m) => self.consume_vehicle_command(m),
            _ => (),
        }
    }

    fn tick(&mut self) {
        self.dispatch_vehicle_state();

        if self.switch_time < 0.0 {
            return;
        }

        let delta = self.ctx.clock.now() - self.switch_time;

        if self.calibration_mode() && delta > self.calibration_duration as f64 {
            debug!("calibration over");
            self.change_mode(OpMode::Service, None);
        } else if self.maneuver_mode() && delta > MANEUVER_TIMEOUT_S {
            info!("maneuver request timeout");
            self.reset();
            self.change_mode(OpMode::Service, None);
        } else {
            return;
        }

        self.switch_time = -1.0;
    }
}
