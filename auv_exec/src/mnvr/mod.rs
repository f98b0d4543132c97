//! # Maneuver framework
//!
//! Maneuver tasks convert high-level intents (Loiter, Goto, Idle) into
//! desired paths and control-loop claims. At most one maneuver task may be
//! active process-wide: admission goes through the [`ManeuverLock`] service
//! with a poll-try-lock/500 ms backoff protocol. The process-wide
//! [`ActiveLoops`] mask tracks which control loops are currently claimed;
//! only the current maneuver and the supervisor modify it.
//!
//! Both services are explicit objects created by the executable and shared
//! by `Arc`; nothing here lives in a static initializer.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod goto;
pub mod idle;
pub mod loiter;
pub mod station_keeping;

pub use goto::GotoTask;
pub use idle::IdleTask;
pub use loiter::LoiterTask;
pub use station_keeping::StationKeepingTask;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, error};

use bus_if::msg::{ControlLoopMask, ControlLoops, ManeuverControlState, McsState, Payload};

use crate::task::TaskCtx;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Backoff between maneuver lock acquisition attempts.
///
/// Units: seconds
const LOCK_BACKOFF_S: f64 = 0.5;

/// ETA reported when unknown.
pub const ETA_UNKNOWN: u16 = 0xFFFF;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Process-wide maneuver admission lock. Non-recursive: a second claim by
/// the same owner is a no-op, a claim while another maneuver owns it fails.
#[derive(Default)]
pub struct ManeuverLock {
    owner: Mutex<Option<String>>,
}

/// Process-wide record of the currently claimed control loops.
#[derive(Default)]
pub struct ActiveLoops {
    mask: Mutex<ControlLoopMask>,
}

/// Shared helpers embedded in every maneuver task: admission, loop claims
/// and execution-state signalling.
pub struct ManeuverCore {
    lock: Arc<ManeuverLock>,
    loops: Arc<ActiveLoops>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl ManeuverLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the lock for `who`. Succeeds when free or already owned
    /// by `who`.
    pub fn try_claim(&self, who: &str) -> bool {
        let mut owner = self.owner.lock().unwrap_or_else(|p| p.into_inner());

        match *owner {
            Some(ref current) => current == who,
            None => {
                *owner = Some(who.into());
                true
            }
        }
    }

    /// Release the lock if `who` owns it.
    pub fn release(&self, who: &str) {
        let mut owner = self.owner.lock().unwrap_or_else(|p| p.into_inner());

        if owner.as_deref() == Some(who) {
            *owner = None;
        }
    }

    pub fn owner(&self) -> Option<String> {
        self.owner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl ActiveLoops {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a control-loops message to the mask.
    pub fn update(&self, msg: &ControlLoops) {
        let mut mask = self.mask.lock().unwrap_or_else(|p| p.into_inner());

        if msg.enable {
            mask.insert(msg.mask);
        } else {
            mask.remove(msg.mask);
        }
    }

    pub fn get(&self) -> ControlLoopMask {
        *self.mask.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl ManeuverCore {
    pub fn new(lock: Arc<ManeuverLock>, loops: Arc<ActiveLoops>) -> Self {
        Self { lock, loops }
    }

    /// Acquire the maneuver lock, polling with backoff until granted or the
    /// task is stopping.
    pub fn acquire(&self, ctx: &TaskCtx) -> bool {
        loop {
            if self.lock.try_claim(&ctx.name) {
                return true;
            }

            if ctx.stopping() {
                return false;
            }

            debug!(
                "\"{}\" waiting for maneuver lock held by {:?}",
                ctx.name,
                self.lock.owner()
            );
            thread::sleep(Duration::from_secs_f64(LOCK_BACKOFF_S));
        }
    }

    pub fn release(&self, ctx: &TaskCtx) {
        self.lock.release(&ctx.name);
    }

    /// Claim exactly the given control loops: everything is disabled first,
    /// then the requested mask is enabled.
    pub fn set_control(&self, ctx: &TaskCtx, mask: ControlLoopMask) {
        if self.loops.get() == mask {
            return;
        }

        let disable = ControlLoops {
            enable: false,
            mask: ControlLoopMask::ALL,
        };
        ctx.dispatch(Payload::ControlLoops(disable.clone()));
        self.loops.update(&disable);

        if !mask.is_empty() {
            let enable = ControlLoops { enable: true, mask };
            ctx.dispatch(Payload::ControlLoops(enable.clone()));
            self.loops.update(&enable);
        }
    }

    pub fn signal_progress(&self, ctx: &TaskCtx, eta: u16, info: &str) {
        ctx.dispatch(Payload::ManeuverControlState(ManeuverControlState {
            state: McsState::Executing,
            eta,
            info: info.into(),
        }));
    }

    pub fn signal_completion(&self, ctx: &TaskCtx, info: &str) {
        debug!("{}", info);

        ctx.dispatch(Payload::ManeuverControlState(ManeuverControlState {
            state: McsState::Done,
            eta: 0,
            info: info.into(),
        }));
    }

    pub fn signal_error(&self, ctx: &TaskCtx, info: &str) {
        error!("{}", info);

        ctx.dispatch(Payload::ManeuverControlState(ManeuverControlState {
            state: McsState::Error,
            eta: 0,
            info: info.into(),
        }));
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lock_single_owner() {
        let lock = ManeuverLock::new();

        assert!(lock.try_claim("Loiter"));
        assert!(lock.try_claim("Loiter"));
        assert!(!lock.try_claim("Goto"));

        // Releases by a non-owner are ignored
        lock.release("Goto");
        assert_eq!(lock.owner().as_deref(), Some("Loiter"));

        lock.release("Loiter");
        assert!(lock.try_claim("Goto"));
    }

    #[test]
    fn test_active_loops_union_difference() {
        let loops = ActiveLoops::new();

        loops.update(&ControlLoops {
            enable: true,
            mask: ControlLoopMask::PATH.union(ControlLoopMask::SPEED),
        });
        assert!(loops.get().contains(ControlLoopMask::PATH));

        loops.update(&ControlLoops {
            enable: false,
            mask: ControlLoopMask::PATH,
        });
        assert!(!loops.get().contains(ControlLoopMask::PATH));
        assert!(loops.get().contains(ControlLoopMask::SPEED));
    }
}
