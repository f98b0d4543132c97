//! # Vehicle supervision, command and entity health messages

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::Payload;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Control-loop arbitration message: enables or disables the loops selected
/// by `mask`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlLoops {
    /// True to enable the masked loops, false to disable them.
    pub enable: bool,

    /// The loops affected by this message.
    pub mask: ControlLoopMask,
}

/// A command to the vehicle supervisor. Requests always produce exactly one
/// reply of type Success or Failure carrying the same `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleCommand {
    pub command_type: VcType,
    pub command: VcCommand,
    pub request_id: u16,

    /// Inline maneuver specification for ExecManeuver requests.
    pub maneuver: Option<Box<Payload>>,

    /// Calibration duration for StartCalibration requests.
    ///
    /// Units: seconds
    pub calib_time: u16,

    /// Human readable information, used in replies.
    pub info: String,
}

/// The vehicle supervisor's state report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub op_mode: OpMode,

    /// Type id of the executing maneuver, [`VehicleState::MANEUVER_NONE`]
    /// when none.
    pub maneuver_type: u16,

    /// Maneuver start time, negative when no maneuver is executing.
    ///
    /// Units: seconds since the Unix epoch
    pub maneuver_stime: f64,

    /// Maneuver estimated time of completion.
    ///
    /// Units: seconds
    pub maneuver_eta: u16,

    pub flags: VehicleStateFlags,

    /// Description and timestamp of the last error.
    pub last_error: String,
    pub last_error_time: f64,

    /// Union of currently enabled control loops.
    pub control_loops: ControlLoopMask,

    /// Number of entities currently in error and their names.
    pub error_count: u8,
    pub error_ents: String,
}

/// Calibration request dispatched when entering calibration mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Units: seconds
    pub duration: u16,
}

/// Plan execution control. Only the start/stop requests are relevant to the
/// supervisor, which tracks the IGNORE_ERRORS flag for safe plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanControl {
    pub command_type: PcType,
    pub op: PcOp,
    pub plan_id: String,
    pub flags: PlanControlFlags,
}

/// Health report for a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub state: EntityHealth,
    pub description: String,
}

/// Aggregated entity health, produced by the entity monitor.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMonitoringState {
    /// Number of entities in a critical (failure) state and their names.
    pub ccount: u8,
    pub cnames: String,

    /// Number of entities in an error state and their names.
    pub ecount: u8,
    pub enames: String,

    /// Description and timestamp of the last reported error.
    pub last_error: String,
    pub last_error_time: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Vehicle command message type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum VcType {
    Request,
    Success,
    Failure,
}

/// Vehicle command verbs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum VcCommand {
    ExecManeuver,
    StopManeuver,
    StartCalibration,
    StopCalibration,
}

/// Vehicle operating modes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum OpMode {
    Service,
    Calibration,
    Error,
    Maneuver,
    External,
}

/// Plan control message type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum PcType {
    Request,
    Success,
    Failure,
    InProgress,
}

/// Plan control operations.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum PcOp {
    Start,
    Stop,
    Load,
    Get,
}

/// Entity health states.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum EntityHealth {
    Boot,
    Normal,
    Fault,
    Error,
    Failure,
}

// ---------------------------------------------------------------------------
// FLAGS
// ---------------------------------------------------------------------------

/// Bitset identifying which controllers are currently authoritative.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlLoopMask(pub u32);

impl ControlLoopMask {
    pub const NONE: ControlLoopMask = ControlLoopMask(0);
    pub const PATH: ControlLoopMask = ControlLoopMask(0x0000_0001);
    pub const SPEED: ControlLoopMask = ControlLoopMask(0x0000_0002);
    pub const DEPTH: ControlLoopMask = ControlLoopMask(0x0000_0004);
    pub const ALTITUDE: ControlLoopMask = ControlLoopMask(0x0000_0008);
    pub const TELEOPERATION: ControlLoopMask = ControlLoopMask(0x0000_0010);
    pub const NO_OVERRIDE: ControlLoopMask = ControlLoopMask(0x8000_0000);
    pub const ALL: ControlLoopMask = ControlLoopMask(0xFFFF_FFFF);

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: ControlLoopMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any of the bits in `other` are set.
    pub fn intersects(&self, other: ControlLoopMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: ControlLoopMask) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: ControlLoopMask) {
        self.0 &= !other.0;
    }

    pub fn union(&self, other: ControlLoopMask) -> ControlLoopMask {
        ControlLoopMask(self.0 | other.0)
    }
}

/// Flag bits of a [`VehicleState`].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleStateFlags(pub u8);

impl VehicleStateFlags {
    /// The executing maneuver has signalled completion.
    pub const MANEUVER_DONE: VehicleStateFlags = VehicleStateFlags(0x01);

    pub fn contains(&self, other: VehicleStateFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: VehicleStateFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: VehicleStateFlags) {
        self.0 &= !other.0;
    }
}

/// Flag bits of a [`PlanControl`].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanControlFlags(pub u8);

impl PlanControlFlags {
    /// Proceed with the plan despite entity errors outside the safe set.
    pub const IGNORE_ERRORS: PlanControlFlags = PlanControlFlags(0x01);

    pub fn contains(&self, other: PlanControlFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: PlanControlFlags) {
        self.0 |= other.0;
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VehicleState {
    /// Sentinel maneuver type when no maneuver is executing.
    pub const MANEUVER_NONE: u16 = 0xFFFF;

    /// Sentinel ETA when unknown.
    pub const ETA_UNKNOWN: u16 = 0xFFFF;
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            op_mode: OpMode::Service,
            maneuver_type: Self::MANEUVER_NONE,
            maneuver_stime: -1.0,
            maneuver_eta: Self::ETA_UNKNOWN,
            flags: VehicleStateFlags::default(),
            last_error: String::new(),
            last_error_time: -1.0,
            control_loops: ControlLoopMask::NONE,
            error_count: 0,
            error_ents: String::new(),
        }
    }
}

impl VehicleCommand {
    /// Build a reply to a request, preserving its verb and request id.
    pub fn reply(request: &VehicleCommand, command_type: VcType, info: &str) -> Self {
        Self {
            command_type,
            command: request.command,
            request_id: request.request_id,
            maneuver: None,
            calib_time: 0,
            info: info.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
