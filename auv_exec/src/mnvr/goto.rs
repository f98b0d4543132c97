//! # Goto maneuver
//!
//! Transit to a single waypoint. Completes when the path controller
//! reports the vehicle near the path endpoint.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use bus_if::msg::{
    ControlLoopMask, DesiredPath, Goto, Message, MessageId, PathControlState, PathCtrlFlags,
    Payload,
};

use crate::task::{Task, TaskCtx};

use super::ManeuverCore;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The goto maneuver task.
pub struct GotoTask {
    ctx: TaskCtx,
    core: ManeuverCore,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl GotoTask {
    pub fn new(ctx: TaskCtx, core: ManeuverCore) -> Self {
        Self { ctx, core }
    }

    fn start(&mut self, maneuver: &Goto) {
        if !self.core.acquire(&self.ctx) {
            return;
        }

        self.set_active(true);
        self.core.set_control(&self.ctx, ControlLoopMask::PATH);

        let path = DesiredPath {
            end_lat: maneuver.lat,
            end_lon: maneuver.lon,
            end_z: maneuver.z,
            end_z_units: maneuver.z_units,
            speed: maneuver.speed,
            speed_units: maneuver.speed_units,
            lradius: 0.0,
            ..Default::default()
        };
        self.ctx.dispatch(Payload::DesiredPath(path));
    }

    fn on_path_control_state(&mut self, pcs: &PathControlState) {
        if !self.is_active() {
            return;
        }

        if pcs.flags.contains(PathCtrlFlags::NEAR) {
            self.set_active(false);
            self.core.signal_completion(&self.ctx, "destination reached");
        } else {
            self.core.signal_progress(&self.ctx, pcs.eta, "");
        }
    }
}

impl Task for GotoTask {
    fn ctx(&self) -> &TaskCtx {
        &self.ctx
    }

    fn ctx_mut(&mut self) -> &mut TaskCtx {
        &mut self.ctx
    }

    fn subscriptions(&self) -> Vec<MessageId> {
        vec![
            MessageId::GOTO,
            MessageId::STOP_MANEUVER,
            MessageId::PATH_CONTROL_STATE,
        ]
    }

    fn on_deactivation(&mut self) {
        self.core.release(&self.ctx);
    }

    fn consume(&mut self, msg: &Message) {
        match msg.payload {
            Payload::Goto(ref m) => self.start(m),
            Payload::StopManeuver => {
                if self.is_active() {
                    self.set_active(false);
                }
            }
            Payload::PathControlState(ref m) => self.on_path_control_state(m),
            _ => (),
        }
    }
}
