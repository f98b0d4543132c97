//! # Loiter maneuver
//!
//! Circles a point at a fixed radius and signed direction by handing the
//! path controller a desired path with a loiter radius. Completion is timed
//! from the moment the path controller reports it is loitering.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::info;

use bus_if::msg::{
    DesiredPath, DesiredPathFlags, Loiter, LoiterDirection, Message, MessageId, PathControlState,
    PathCtrlFlags, Payload,
};
use bus_if::msg::ControlLoopMask;

use crate::task::{Task, TaskCtx};

use super::{ManeuverCore, ETA_UNKNOWN};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The loiter maneuver task.
pub struct LoiterTask {
    ctx: TaskCtx,
    core: ManeuverCore,

    /// Duration to loiter for once on the circle, zero for unbounded.
    ///
    /// Units: seconds
    duration: u16,

    /// Completion deadline, negative until loitering starts.
    end_time: f64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl LoiterTask {
    pub fn new(ctx: TaskCtx, core: ManeuverCore) -> Self {
        Self {
            ctx,
            core,
            duration: 0,
            end_time: -1.0,
        }
    }

    fn start(&mut self, maneuver: &Loiter) {
        if !self.core.acquire(&self.ctx) {
            return;
        }

        self.set_active(true);
        self.core.set_control(&self.ctx, ControlLoopMask::PATH);

        if maneuver.radius < 0.0 {
            self.set_active(false);
            self.core.signal_error(&self.ctx, "invalid loiter radius");
            return;
        }

        let mut flags = DesiredPathFlags::default();
        if maneuver.direction == LoiterDirection::CounterClockwise {
            flags.insert(DesiredPathFlags::CCLOCKW);
        }

        let path = DesiredPath {
            end_lat: maneuver.lat,
            end_lon: maneuver.lon,
            end_z: maneuver.z,
            end_z_units: maneuver.z_units,
            speed: maneuver.speed,
            speed_units: maneuver.speed_units,
            lradius: maneuver.radius,
            flags,
            ..Default::default()
        };
        self.ctx.dispatch(Payload::DesiredPath(path));

        self.duration = maneuver.duration;
        self.end_time = -1.0;
    }

    fn on_path_control_state(&mut self, pcs: &PathControlState) {
        if !self.is_active() {
            return;
        }

        if pcs.flags.contains(PathCtrlFlags::LOITERING) {
            if self.duration == 0 {
                self.core.signal_progress(&self.ctx, ETA_UNKNOWN, "");
                return;
            }

            let now = self.ctx.clock.now();

            if self.end_time < 0.0 {
                self.end_time = now + self.duration as f64;
                info!("will now loiter for {} seconds", self.duration);
            } else if now >= self.end_time {
                self.set_active(false);
                self.core.signal_completion(&self.ctx, "loiter complete");
            } else {
                self.core
                    .signal_progress(&self.ctx, (self.end_time - now).round() as u16, "");
            }
        } else if self.duration > 0 {
            self.core
                .signal_progress(&self.ctx, pcs.eta.saturating_add(self.duration), "");
        } else {
            self.core.signal_progress(&self.ctx, ETA_UNKNOWN, "");
        }
    }
}

impl Task for LoiterTask {
    fn ctx(&self) -> &TaskCtx {
        &self.ctx
    }

    fn ctx_mut(&mut self) -> &mut TaskCtx {
        &mut self.ctx
    }

    fn subscriptions(&self) -> Vec<MessageId> {
        vec![
            MessageId::LOITER,
            MessageId::STOP_MANEUVER,
            MessageId::PATH_CONTROL_STATE,
        ]
    }

    fn on_deactivation(&mut self) {
        self.core.release(&self.ctx);
    }

    fn consume(&mut self, msg: &Message) {
        match msg.payload {
            Payload::Loiter(ref m) => self.start(m),
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
