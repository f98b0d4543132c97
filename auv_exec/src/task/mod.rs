//! # Task framework
//!
//! A task is a lifecycle-managed concurrent component owning one or more
//! entities, subscribing to and publishing messages. Each task runs on its
//! own OS thread (see [`runner`]); within a task, handler invocations are
//! serialized, so the task's thread is the sole mutator of its state.
//!
//! Lifecycle stages, each of which may fail:
//!
//! 1. parameters bound and validated (invalid parameters are fatal)
//! 2. `on_update_parameters`
//! 3. entity reservation and resolution
//! 4. resource acquisition, retried with backoff on
//!    [`TaskError::RestartNeeded`]
//! 5. resource initialization
//! 6. main loop (event-driven or periodic)
//! 7. resource release (idempotent)

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod ctx;
pub mod entity;
pub mod runner;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use thiserror::Error;

use bus_if::msg::{Message, MessageId};

use crate::config::{ChangedParams, ParamError, TaskSection};

pub use ctx::TaskCtx;
pub use entity::{EntityDb, EntityError, ENT_UNRESOLVED};
pub use runner::{spawn, TaskHandle};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// How a task's main loop is driven.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Execution {
    /// Blocks on the bus, consuming messages as they arrive.
    Event,

    /// Invoked at the given frequency with catch-up-but-no-burst semantics.
    ///
    /// Units: Hertz
    Periodic(f64),
}

/// Errors raised by task lifecycle hooks.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Resource acquisition failed transiently; re-run it after the given
    /// delay.
    #[error("restart needed in {0:.1} s: {1}")]
    RestartNeeded(f64, String),

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error("{0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// The task behavior contract consumed by the framework.
///
/// All hooks default to no-ops; a task implements the ones it needs.
/// Event-driven tasks implement [`Task::consume`]; periodic tasks implement
/// [`Task::tick`] and return `Execution::Periodic` from
/// [`Task::execution`].
pub trait Task: Send {
    fn ctx(&self) -> &TaskCtx;

    fn ctx_mut(&mut self) -> &mut TaskCtx;

    fn execution(&self) -> Execution {
        Execution::Event
    }

    /// The message types this task consumes. Collected once, before the
    /// main loop starts.
    fn subscriptions(&self) -> Vec<MessageId> {
        Vec::new()
    }

    /// Deserialise and validate this task's parameter section.
    fn bind_params(&mut self, _section: &TaskSection) -> Result<(), ParamError> {
        Ok(())
    }

    /// Called after parameters are (re)bound; must recompute derived state.
    fn on_update_parameters(&mut self, _changed: &ChangedParams) {}

    /// Reserve additional entities besides the default one named after the
    /// task.
    fn on_entity_reservation(&mut self) {}

    /// Resolve entity labels configured by other tasks into numeric ids.
    fn on_entity_resolution(&mut self) -> Result<(), TaskError> {
        Ok(())
    }

    /// Acquire OS resources. May return [`TaskError::RestartNeeded`] to
    /// schedule a retry.
    fn on_resource_acquisition(&mut self) -> Result<(), TaskError> {
        Ok(())
    }

    /// Logical initialization once resources are up.
    fn on_resource_initialization(&mut self) -> Result<(), TaskError> {
        Ok(())
    }

    /// Idempotent teardown, invoked on every exit path.
    fn on_resource_release(&mut self) {}

    fn on_activation(&mut self) {}

    fn on_deactivation(&mut self) {}

    /// Consume one message from the bus.
    fn consume(&mut self, _msg: &Message) {}

    /// Called roughly once per second from the main loop, active or not.
    /// Used by maneuver tasks for progress reporting.
    fn on_report(&mut self) {}

    /// The periodic hook for `Execution::Periodic` tasks.
    fn tick(&mut self) {}

    /// Drive the activation edge, invoking `on_activation` /
    /// `on_deactivation` exactly once per change.
    fn set_active(&mut self, active: bool) {
        if self.ctx().active == active {
            return;
        }

        self.ctx_mut().active = active;

        if active {
            self.on_activation();
        } else {
            self.on_deactivation();
        }
    }

    fn is_active(&self) -> bool {
        self.ctx().active
    }
}
