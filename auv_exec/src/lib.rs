//! # AUV control runtime library
//!
//! Hosts the concurrent task population of the onboard control framework:
//! the vehicle supervisor, the path controller with its bottom tracker,
//! the maneuver tasks and the entity monitor. Tasks communicate exclusively
//! over the in-process bus defined in [`bus_if`]; there are no direct calls
//! across task boundaries.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod app;
pub mod config;
pub mod control;
pub mod mnvr;
pub mod monitors;
pub mod supervisor;
pub mod task;
