//! # Control modules
//!
//! Guidance-level controllers: the path controller (which consumes
//! [`bus_if::msg::DesiredPath`] references and produces lower-level course,
//! speed and vertical references) and its nested bottom tracker (which
//! overrides depth references when terrain becomes dangerous).

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod bottom;
pub mod path;
