//! Shared test harness: a real bus with a capture inbox and a manual
//! clock, driving tasks synchronously through their lifecycle hooks.

use std::sync::Arc;

use auv_exec::config::{ChangedParams, TaskSection};
use auv_exec::task::{EntityDb, Task, TaskCtx};
use bus_if::bus::{Bus, Inbox};
use bus_if::msg::{Message, MessageId, Payload};
use util::time::Clock;

/// Every catalog id, so the capture inbox observes all traffic.
const ALL_IDS: &[MessageId] = &[
    MessageId::ENTITY_STATE,
    MessageId::DISTANCE,
    MessageId::ESTIMATED_STATE,
    MessageId::NAVIGATION_UNCERTAINTY,
    MessageId::DESIRED_HEADING,
    MessageId::DESIRED_Z,
    MessageId::DESIRED_SPEED,
    MessageId::DESIRED_PATH,
    MessageId::PATH_CONTROL_STATE,
    MessageId::BRAKE,
    MessageId::GOTO,
    MessageId::TELEOPERATION,
    MessageId::LOITER,
    MessageId::STATION_KEEPING,
    MessageId::IDLE_MANEUVER,
    MessageId::STOP_MANEUVER,
    MessageId::MANEUVER_CONTROL_STATE,
    MessageId::VEHICLE_STATE,
    MessageId::VEHICLE_COMMAND,
    MessageId::ENTITY_MONITORING_STATE,
    MessageId::CALIBRATION,
    MessageId::CONTROL_LOOPS,
    MessageId::ABORT,
    MessageId::PLAN_CONTROL,
];

/// Synchronous task test harness.
pub struct Harness {
    pub bus: Bus,
    pub clock: Arc<Clock>,
    pub entities: Arc<EntityDb>,
    pub capture: Inbox,
}

impl Harness {
    pub fn new() -> Self {
        let bus = Bus::new(0x20);
        let capture = Inbox::new(4096);

        for id in ALL_IDS {
            bus.subscribe(&capture, *id);
        }

        Self {
            bus,
            clock: Arc::new(Clock::manual()),
            entities: Arc::new(EntityDb::new()),
            capture,
        }
    }

    pub fn ctx(&self, name: &str) -> TaskCtx {
        TaskCtx::new(name, self.bus.clone(), self.clock.clone(), self.entities.clone())
    }

    /// Drive a task through its startup lifecycle without spawning a
    /// thread, then discard the startup traffic.
    pub fn init(&self, task: &mut dyn Task, section: &TaskSection) {
        task.bind_params(section).expect("parameter binding failed");
        task.on_update_parameters(&ChangedParams::all());

        let name = task.ctx().name.clone();
        let entity = self.entities.reserve(&name).expect("entity reservation");
        task.ctx_mut().entity = entity;

        task.on_entity_reservation();
        task.on_entity_resolution().expect("entity resolution");
        task.on_resource_acquisition().expect("resource acquisition");
        task.on_resource_initialization().expect("resource init");

        self.drain();
    }

    /// Take everything the capture inbox has seen so far.
    pub fn drain(&self) -> Vec<Message> {
        let mut messages = Vec::new();

        while let Some(msg) = self.capture.try_recv() {
            messages.push(msg);
        }

        messages
    }
}

/// Build a broadcast message with a default header.
pub fn msg(payload: Payload) -> Message {
    Message::new(payload)
}

/// Build a message stamped as originating from this system.
pub fn msg_from_self(payload: Payload) -> Message {
    let mut m = Message::new(payload);
    m.header.src_sys = 0x20;
    m
}
