//! # Task context
//!
//! Shared handle set owned by every task: bus access with stamped identity,
//! the task's inbox, the process clock, the entity registry and the
//! cooperative stop flag.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bus_if::bus::{Bus, Inbox, PublishFlags};
use bus_if::msg::{vehicle::EntityHealth, vehicle::EntityState, Message, Payload};
use util::time::Clock;

use super::entity::EntityDb;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Per-task runtime context.
pub struct TaskCtx {
    pub name: String,

    pub bus: Bus,
    pub inbox: Inbox,
    pub clock: Arc<Clock>,
    pub entities: Arc<EntityDb>,

    /// This task's default entity id, assigned during entity reservation.
    pub entity: u8,

    /// Activation state, driven through `Task::set_active`.
    pub active: bool,

    stopping: Arc<AtomicBool>,

    /// Health of every entity owned by this task, keyed by entity id.
    states: BTreeMap<u8, (EntityHealth, String)>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TaskCtx {
    pub fn new(name: &str, bus: Bus, clock: Arc<Clock>, entities: Arc<EntityDb>) -> Self {
        Self {
            name: name.into(),
            bus,
            inbox: Inbox::default(),
            clock,
            entities,
            entity: bus_if::msg::ENT_NONE,
            active: false,
            stopping: Arc::new(AtomicBool::new(false)),
            states: BTreeMap::new(),
        }
    }

    /// The cooperative stop flag, checked at every suspension point.
    pub fn stopping(&self) -> bool {
        self.stopping.load(Ordering::Relaxed)
    }

    /// Request a cooperative stop of the owning task.
    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::Relaxed);
    }

    pub(super) fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stopping.clone()
    }

    /// Block until a message is ready or the timeout elapses.
    pub fn wait_for_messages(&self, timeout_s: f64) -> Option<Message> {
        self.inbox.wait(timeout_s)
    }

    /// Publish a payload stamped with this task's identity.
    pub fn dispatch(&self, payload: Payload) {
        self.dispatch_flags(payload, PublishFlags::NONE);
    }

    /// Publish a payload with explicit publish flags.
    pub fn dispatch_flags(&self, payload: Payload, flags: PublishFlags) {
        self.dispatch_from(self.entity, payload, flags);
    }

    /// Publish a payload on behalf of one of this task's entities.
    pub fn dispatch_from(&self, entity: u8, payload: Payload, flags: PublishFlags) {
        let mut msg = Message::new(payload);
        msg.header.src_ent = entity;

        self.bus
            .publish(msg, flags, self.clock.since_epoch(), Some(self.inbox.id()));
    }

    /// Set the health of this task's default entity, publishing the change.
    pub fn set_entity_state(&mut self, health: EntityHealth, description: &str) {
        self.set_entity_state_for(self.entity, health, description);
    }

    /// Set the health of one of this task's entities, publishing the change.
    pub fn set_entity_state_for(&mut self, entity: u8, health: EntityHealth, description: &str) {
        let entry = (health, description.to_string());

        if self.states.get(&entity) == Some(&entry) {
            return;
        }

        self.states.insert(entity, entry);

        self.dispatch_from(
            entity,
            Payload::EntityState(EntityState {
                state: health,
                description: description.into(),
            }),
            PublishFlags::NONE,
        );
    }

    /// The current health of this task's default entity.
    pub fn entity_state(&self) -> Option<EntityHealth> {
        self.states.get(&self.entity).map(|(h, _)| *h)
    }

    /// Re-publish the health of every entity owned by this task. Entity
    /// lifecycle: reserved at construction, resolved once at startup,
    /// published periodically.
    pub fn publish_entity_states(&self) {
        for (entity, (health, description)) in &self.states {
            self.dispatch_from(
                *entity,
                Payload::EntityState(EntityState {
                    state: *health,
                    description: description.clone(),
                }),
                PublishFlags::NONE,
            );
        }
    }
}
