//! # Task runner
//!
//! Drives a task's lifecycle on a dedicated OS thread: parameter binding,
//! entity reservation/resolution, resource acquisition with restart
//! backoff, the main loop, and idempotent release on every exit path.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use bus_if::msg::vehicle::EntityHealth;

use super::{Execution, Task, TaskError};
use crate::config::{ChangedParams, TaskSection};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Timeout used when blocking on the bus in event-driven loops.
///
/// Units: seconds
const WAIT_TIMEOUT_S: f64 = 1.0;

/// Interval between periodic entity-state reports.
///
/// Units: seconds
const REPORT_PERIOD_S: f64 = 1.0;

/// Granularity of interruptible sleeps, so stop requests are honoured
/// promptly during restart backoff.
///
/// Units: seconds
const SLEEP_SLICE_S: f64 = 0.1;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handle to a spawned task thread.
pub struct TaskHandle {
    pub name: String,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TaskHandle {
    /// Request a cooperative stop. The task observes the flag at its next
    /// suspension point.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Request a stop and wait for the thread to unwind.
    pub fn join(mut self) {
        self.stop();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Task \"{}\" thread panicked", self.name);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Spawn a task on its own thread, driving the full lifecycle.
pub fn spawn(task: Box<dyn Task>, section: TaskSection) -> TaskHandle {
    let name = task.ctx().name.clone();
    let stop = task.ctx().stop_flag();

    let thread_name = name.clone();
    let thread = thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || run(task, section))
        .unwrap_or_else(|e| panic!("could not spawn thread for task \"{}\": {}", thread_name, e));

    TaskHandle {
        name,
        stop,
        thread: Some(thread),
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn run(mut task: Box<dyn Task>, section: TaskSection) {
    let name = task.ctx().name.clone();

    // ---- PARAMETERS ----

    // Invalid parameters are fatal at bind time: the task never starts
    if let Err(e) = task.bind_params(&section) {
        error!("Task \"{}\" parameter binding failed: {}", name, e);
        return;
    }

    task.on_update_parameters(&ChangedParams::all());

    // ---- ENTITIES ----

    let default_entity = match task.ctx().entities.reserve(&name) {
        Ok(id) => id,
        Err(e) => {
            error!("Task \"{}\" entity reservation failed: {}", name, e);
            return;
        }
    };

    task.ctx_mut().entity = default_entity;
    task.ctx_mut()
        .set_entity_state(EntityHealth::Boot, "initialising");

    task.on_entity_reservation();

    if let Err(e) = task.on_entity_resolution() {
        error!("Task \"{}\" entity resolution failed: {}", name, e);
        return;
    }

    // ---- SUBSCRIPTIONS ----

    // Subscriptions are collected once, before the main loop
    let subscriptions = task.subscriptions();
    {
        let ctx = task.ctx();
        for id in subscriptions {
            ctx.bus.subscribe(&ctx.inbox, id);
        }
    }

    // ---- RESOURCES ----

    if !acquire_resources(&mut *task) {
        task.on_resource_release();
        return;
    }

    if let Err(e) = task.on_resource_initialization() {
        error!("Task \"{}\" resource initialization failed: {}", name, e);
        task.ctx_mut()
            .set_entity_state(EntityHealth::Failure, &e.to_string());
        task.on_resource_release();
        return;
    }

    task.ctx_mut().set_entity_state(EntityHealth::Normal, "active");
    info!("Task \"{}\" entering main loop", name);

    // ---- MAIN LOOP ----

    main_loop(&mut *task);

    // ---- RELEASE ----

    task.set_active(false);
    task.on_resource_release();
    debug!("Task \"{}\" stopped", name);
}

/// Run the acquisition hook, re-running it with backoff on RestartNeeded.
/// Returns false if the task must not start.
fn acquire_resources(task: &mut dyn Task) -> bool {
    let name = task.ctx().name.clone();

    loop {
        if task.ctx().stopping() {
            return false;
        }

        match task.on_resource_acquisition() {
            Ok(()) => return true,
            Err(TaskError::RestartNeeded(delay_s, why)) => {
                warn!(
                    "Task \"{}\" resource acquisition needs restart in {:.1} s: {}",
                    name, delay_s, why
                );
                task.ctx_mut().set_entity_state(EntityHealth::Fault, &why);

                // Release before retrying so acquisition starts clean
                task.on_resource_release();
                sleep_checked(task, delay_s);
            }
            Err(e) => {
                error!("Task \"{}\" resource acquisition failed: {}", name, e);
                task.ctx_mut()
                    .set_entity_state(EntityHealth::Failure, &e.to_string());
                return false;
            }
        }
    }
}

fn main_loop(task: &mut dyn Task) {
    let period_s = match task.execution() {
        Execution::Event => None,
        Execution::Periodic(hz) => Some(1.0 / hz.max(1e-3)),
    };

    let now = task.ctx().clock.now();
    let mut next_tick = period_s.map(|p| now + p);
    let mut next_report = now + REPORT_PERIOD_S;

    while !task.ctx().stopping() {
        // Block on the bus until the next deadline
        let timeout = match next_tick {
            Some(t) => (t - task.ctx().clock.now()).clamp(0.0, WAIT_TIMEOUT_S),
            None => WAIT_TIMEOUT_S,
        };

        if let Some(msg) = task.ctx().wait_for_messages(timeout) {
            dispatch_consume(task, &msg);

            // Drain whatever else arrived while we were busy
            while let Some(msg) = task.ctx().inbox.try_recv() {
                dispatch_consume(task, &msg);
            }
        }

        let now = task.ctx().clock.now();

        if let Some(t) = next_tick {
            if now >= t {
                task.tick();

                let after = task.ctx().clock.now();
                let period = period_s.unwrap_or(WAIT_TIMEOUT_S);

                // Catch up without bursting: the next tick never moves into
                // the past
                let scheduled = t + period;
                if after > scheduled {
                    warn!(
                        "Task \"{}\" tick overran by {:.3} s",
                        task.ctx().name,
                        after - scheduled
                    );
                    next_tick = Some(after);
                } else {
                    next_tick = Some(scheduled);
                }
            }
        }

        if now >= next_report {
            report_housekeeping(task);
            next_report = now + REPORT_PERIOD_S;
        }
    }
}

/// Consume one message, containing panics to the offending handler.
fn dispatch_consume(task: &mut dyn Task, msg: &bus_if::msg::Message) {
    let result = catch_unwind(AssertUnwindSafe(|| task.consume(msg)));

    if result.is_err() {
        error!(
            "Task \"{}\" handler for {} panicked, message discarded",
            task.ctx().name,
            msg.payload.abbrev()
        );
    }
}

/// Periodic housekeeping: entity-state publication, inbox overflow
/// degradation reporting, and the task's own report hook.
fn report_housekeeping(task: &mut dyn Task) {
    let dropped = task.ctx().inbox.take_dropped();

    if dropped > 0 {
        let desc = format!("inbox overflow, {} messages dropped", dropped);
        warn!("Task \"{}\": {}", task.ctx().name, desc);
        task.ctx_mut().set_entity_state(EntityHealth::Fault, &desc);
    }

    task.ctx().publish_entity_states();
    task.on_report();
}

/// Sleep in slices so stop requests interrupt the wait.
fn sleep_checked(task: &dyn Task, duration_s: f64) {
    let mut remaining = duration_s;

    while remaining > 0.0 && !task.ctx().stopping() {
        let slice = remaining.min(SLEEP_SLICE_S);
        thread::sleep(Duration::from_secs_f64(slice));
        remaining -= slice;
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::task::TaskCtx;
    use bus_if::bus::{Bus, Inbox};
    use bus_if::msg::{Message, MessageId, Payload};
    use std::sync::Mutex;
    use util::time::Clock;

    struct Echo {
        ctx: TaskCtx,
        seen: Arc<Mutex<Vec<f64>>>,
        acquisitions: Arc<Mutex<u32>>,
        fail_first_acquisition: bool,
    }

    impl Task for Echo {
        fn ctx(&self) -> &TaskCtx {
            &self.ctx
        }

        fn ctx_mut(&mut self) -> &mut TaskCtx {
            &mut self.ctx
        }

        fn subscriptions(&self) -> Vec<MessageId> {
            vec![MessageId::DESIRED_Z]
        }

        fn on_resource_acquisition(&mut self) -> Result<(), TaskError> {
            let mut count = self.acquisitions.lock().unwrap();
            *count += 1;

            if self.fail_first_acquisition && *count == 1 {
                return Err(TaskError::RestartNeeded(0.05, "transient".into()));
            }

            Ok(())
        }

        fn consume(&mut self, msg: &Message) {
            if let Payload::DesiredZ(ref z) = msg.payload {
                self.seen.lock().unwrap().push(z.value);
                self.ctx.dispatch(Payload::Abort);
            }
        }
    }

    #[test]
    fn test_event_task_lifecycle() {
        let bus = Bus::new(1);
        let clock = Arc::new(Clock::monotonic());
        let entities = Arc::new(crate::task::EntityDb::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let acquisitions = Arc::new(Mutex::new(0));

        let task = Box::new(Echo {
            ctx: TaskCtx::new("Echo", bus.clone(), clock.clone(), entities),
            seen: seen.clone(),
            acquisitions: acquisitions.clone(),
            fail_first_acquisition: true,
        });

        let capture = Inbox::default();
        bus.subscribe(&capture, MessageId::ABORT);

        let handle = spawn(task, TaskSection::default());

        // Give the task time to retry acquisition and subscribe
        thread::sleep(Duration::from_millis(300));

        bus.publish(
            Message::new(Payload::DesiredZ(bus_if::msg::DesiredZ {
                value: 7.0,
                z_units: bus_if::msg::ZUnits::Depth,
            })),
            bus_if::bus::PublishFlags::NONE,
            clock.since_epoch(),
            None,
        );

        // The reply proves the message hopped threads and was consumed
        assert!(capture.wait(1.0).is_some());
        assert_eq!(seen.lock().unwrap().as_slice(), &[7.0]);
        assert_eq!(*acquisitions.lock().unwrap(), 2);

        handle.join();
    }
}
