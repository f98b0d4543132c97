//! # Entity monitor
//!
//! Aggregates the periodic [`EntityState`] reports of every entity in the
//! process into a single [`EntityMonitoringState`] summary for the vehicle
//! supervisor: counts and names of entities in error and in failure, plus
//! the most recent error description.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::BTreeMap;

use bus_if::msg::{
    vehicle::EntityHealth, EntityMonitoringState, EntityState, Message, MessageId, Payload,
};

use crate::task::{Execution, Task, TaskCtx};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Summary publication frequency.
///
/// Units: Hertz
pub const TICK_FREQUENCY_HZ: f64 = 1.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One observed entity.
struct EntityRecord {
    health: EntityHealth,
    description: String,

    /// Timestamp of the report that set this record.
    time: f64,
}

/// The entity monitor task.
pub struct EntityMonitor {
    ctx: TaskCtx,

    /// Last report per entity id.
    records: BTreeMap<u8, EntityRecord>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl EntityMonitor {
    pub fn new(ctx: TaskCtx) -> Self {
        Self {
            ctx,
            records: BTreeMap::new(),
        }
    }

    fn consume_entity_state(&mut self, src_ent: u8, timestamp: f64, msg: &EntityState) {
        self.records.insert(
            src_ent,
            EntityRecord {
                health: msg.state,
                description: msg.description.clone(),
                time: timestamp,
            },
        );
    }

    fn entity_name(&self, id: u8) -> String {
        self.ctx
            .entities
            .label_of(id)
            .unwrap_or_else(|| format!("entity {}", id))
    }

    /// Build the aggregate summary from the current records.
    fn summarise(&self) -> EntityMonitoringState {
        let mut summary = EntityMonitoringState::default();
        let mut cnames: Vec<String> = Vec::new();
        let mut enames: Vec<String> = Vec::new();
        summary.last_error_time = -1.0;

        for (id, record) in &self.records {
            match record.health {
                EntityHealth::Failure => cnames.push(self.entity_name(*id)),
                EntityHealth::Error => enames.push(self.entity_name(*id)),
                _ => continue,
            }

            if record.time > summary.last_error_time {
                summary.last_error = record.description.clone();
                summary.last_error_time = record.time;
            }
        }

        summary.ccount = cnames.len() as u8;
        summary.cnames = cnames.join(",");
        summary.ecount = enames.len() as u8;
        summary.enames = enames.join(",");

        summary
    }
}

impl Task for EntityMonitor {
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
        vec![MessageId::ENTITY_STATE]
    }

    fn consume(&mut self, msg: &Message) {
        if let Payload::EntityState(ref m) = msg.payload {
            self.consume_entity_state(msg.header.src_ent, msg.header.timestamp, m);
        }
    }

    fn tick(&mut self) {
        let summary = self.summarise();
        self.ctx.dispatch(Payload::EntityMonitoringState(summary));
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use bus_if::bus::Bus;
    use std::sync::Arc;
    use util::time::Clock;

    fn monitor() -> EntityMonitor {
        let bus = Bus::new(1);
        let clock = Arc::new(Clock::manual());
        let entities = Arc::new(crate::task::EntityDb::new());

        entities.reserve("IMU").unwrap();
        entities.reserve("Echo Sounder").unwrap();

        EntityMonitor::new(TaskCtx::new("Entity Monitor", bus, clock, entities))
    }

    fn state_msg(src_ent: u8, time: f64, health: EntityHealth, desc: &str) -> Message {
        let mut msg = Message::new(Payload::EntityState(EntityState {
            state: health,
            description: desc.into(),
        }));
        msg.header.src_ent = src_ent;
        msg.header.timestamp = time;
        msg
    }

    #[test]
    fn test_aggregation() {
        let mut mon = monitor();

        mon.consume(&state_msg(0, 1.0, EntityHealth::Normal, "active"));
        assert_eq!(mon.summarise().ecount, 0);

        mon.consume(&state_msg(0, 2.0, EntityHealth::Error, "gyro saturated"));
        mon.consume(&state_msg(1, 3.0, EntityHealth::Failure, "no echo"));

        let summary = mon.summarise();
        assert_eq!(summary.ecount, 1);
        assert_eq!(summary.enames, "IMU");
        assert_eq!(summary.ccount, 1);
        assert_eq!(summary.cnames, "Echo Sounder");
        assert_eq!(summary.last_error, "no echo");
        assert_eq!(summary.last_error_time, 3.0);

        // Recovery clears the counts
        mon.consume(&state_msg(0, 4.0, EntityHealth::Normal, "active"));
        mon.consume(&state_msg(1, 5.0, EntityHealth::Normal, "active"));
        let summary = mon.summarise();
        assert_eq!(summary.ecount, 0);
        assert_eq!(summary.ccount, 0);
    }
}
