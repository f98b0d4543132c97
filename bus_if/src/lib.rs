//! # Bus interface library
//!
//! This crate defines the typed message catalog exchanged between tasks and
//! the in-process publish/subscribe bus that transports it. Every emission
//! in the system crosses the bus: there are no direct calls across task
//! boundaries.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod bus;
pub mod msg;
