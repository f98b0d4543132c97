//! # Application wiring
//!
//! Builds the process-wide services (bus, clock, entity registry, maneuver
//! lock, active-loop mask), constructs the task population and spawns each
//! task on its own thread. Shutdown is cooperative and unwinds the tasks
//! in reverse start order.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::Arc;

use log::info;

use bus_if::bus::Bus;
use util::time::Clock;

use crate::config::Config;
use crate::control::path::{LosSteering, PathControl};
use crate::mnvr::{
    ActiveLoops, GotoTask, IdleTask, LoiterTask, ManeuverCore, ManeuverLock, StationKeepingTask,
};
use crate::monitors::EntityMonitor;
use crate::supervisor::Supervisor;
use crate::task::{self, EntityDb, Task, TaskCtx, TaskHandle};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Task names, also used as configuration section keys.
pub const SUPERVISOR: &str = "Vehicle Supervisor";
pub const ENTITY_MONITOR: &str = "Entity Monitor";
pub const PATH_CONTROLLER: &str = "Path Controller";
pub const LOITER: &str = "Maneuver.Loiter";
pub const STATION_KEEPING: &str = "Maneuver.StationKeeping";
pub const GOTO: &str = "Maneuver.Goto";
pub const IDLE: &str = "Maneuver.Idle";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The running application.
pub struct App {
    pub bus: Bus,
    pub clock: Arc<Clock>,
    pub entities: Arc<EntityDb>,

    handles: Vec<TaskHandle>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl App {
    /// Build the services and spawn the task population.
    pub fn start(config: &Config) -> Self {
        let bus = Bus::new(config.system_id);
        let clock = Arc::new(Clock::monotonic());
        let entities = Arc::new(EntityDb::new());

        let mnvr_lock = Arc::new(ManeuverLock::new());
        let active_loops = Arc::new(ActiveLoops::new());

        let ctx = |name: &str| TaskCtx::new(name, bus.clone(), clock.clone(), entities.clone());
        let core = || ManeuverCore::new(mnvr_lock.clone(), active_loops.clone());

        let tasks: Vec<Box<dyn Task>> = vec![
            Box::new(Supervisor::new(ctx(SUPERVISOR))),
            Box::new(EntityMonitor::new(ctx(ENTITY_MONITOR))),
            Box::new(PathControl::new(
                ctx(PATH_CONTROLLER),
                Box::new(LosSteering::new(10.0)),
            )),
            Box::new(LoiterTask::new(ctx(LOITER), core())),
            Box::new(StationKeepingTask::new(ctx(STATION_KEEPING), core())),
            Box::new(GotoTask::new(ctx(GOTO), core())),
            Box::new(IdleTask::new(ctx(IDLE), core())),
        ];

        let mut handles = Vec::with_capacity(tasks.len());

        for t in tasks {
            let name = t.ctx().name.clone();
            handles.push(task::spawn(t, config.section(&name)));
            info!("Task \"{}\" spawned", name);
        }

        Self {
            bus,
            clock,
            entities,
            handles,
        }
    }

    /// Stop every task, unwinding in reverse start order.
    pub fn stop(mut self) {
        info!("Stopping all tasks");

        // Signal everyone first so the unwind is not serialized on the bus
        for handle in &self.handles {
            handle.stop();
        }

        while let Some(handle) = self.handles.pop() {
            let name = handle.name.clone();
            handle.join();
            info!("Task \"{}\" joined", name);
        }
    }
}
