//! # Idle maneuver
//!
//! Keep-position null maneuver: releases every control loop and waits out
//! its duration. Dispatched by the supervisor as part of error recovery
//! and usable as an explicit plan step.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use bus_if::msg::{ControlLoopMask, IdleManeuver, Message, MessageId, Payload};

use crate::task::{Task, TaskCtx};

use super::{ManeuverCore, ETA_UNKNOWN};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The idle maneuver task.
pub struct IdleTask {
    ctx: TaskCtx,
    core: ManeuverCore,

    /// Completion deadline, negative for unbounded idling.
    end_time: f64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl IdleTask {
    pub fn new(ctx: TaskCtx, core: ManeuverCore) -> Self {
        Self {
            ctx,
            core,
            end_time: -1.0,
        }
    }

    fn start(&mut self, maneuver: &IdleManeuver) {
        if !self.core.acquire(&self.ctx) {
            return;
        }

        self.set_active(true);

        // Idling claims nothing: every loop is released
        self.core.set_control(&self.ctx, ControlLoopMask::NONE);

        self.end_time = if maneuver.duration > 0 {
            self.ctx.clock.now() + maneuver.duration as f64
        } else {
            -1.0
        };

        let eta = if maneuver.duration > 0 {
            maneuver.duration
        } else {
            ETA_UNKNOWN
        };
        self.core.signal_progress(&self.ctx, eta, "idling");
    }
}

impl Task for IdleTask {
    fn ctx(&self) -> &TaskCtx {
        &self.ctx
    }

    fn ctx_mut(&mut self) -> &mut TaskCtx {
        &mut self.ctx
    }

    fn subscriptions(&self) -> Vec<MessageId> {
        vec![MessageId::IDLE_MANEUVER, MessageId::STOP_MANEUVER]
    }

    fn on_deactivation(&mut self) {
        self.core.release(&self.ctx);
    }

    fn consume(&mut self, msg: &Message) {
        match msg.payload {
            Payload::IdleManeuver(ref m) => self.start(m),
            Payload::StopManeuver => {
                if self.is_active() {
                    self.set_active(false);
                }
            }
            _ => (),
        }
    }

    fn on_report(&mut self) {
        if !self.is_active() {
            return;
        }

        if self.end_time < 0.0 {
            self.core.signal_progress(&self.ctx, ETA_UNKNOWN, "idling");
            return;
        }

        let now = self.ctx.clock.now();

        if now >= self.end_time {
            self.set_active(false);
            self.core.signal_completion(&self.ctx, "idle time elapsed");
        } else {
            self.core
                .signal_progress(&self.ctx, (self.end_time - now).round() as u16, "idling");
        }
    }
}
