//! # Message catalog
//!
//! Messages are tagged records: a [`Header`] carrying identity and time plus
//! a typed [`Payload`]. Payloads are grouped by concern:
//!
//! - [`nav`]: navigation and ranging inputs
//! - [`guidance`]: path references and tracking state
//! - [`vehicle`]: vehicle supervision, commands and entity health
//! - [`mnvr`]: maneuver intents and maneuver execution state
//!
//! All angles are radians, distances meters, speeds meters/second and
//! timestamps seconds since the Unix epoch, at the bus boundary.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod guidance;
pub mod mnvr;
pub mod nav;
pub mod vehicle;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

pub use guidance::*;
pub use mnvr::*;
pub use nav::*;
pub use vehicle::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// System address used when the source is not yet stamped, and as the
/// broadcast destination.
pub const SYS_NONE: u16 = 0xFFFF;

/// Entity address used when the source entity is not yet stamped, and as the
/// any-entity destination.
pub const ENT_NONE: u8 = 0xFF;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Stable 16-bit message type identifier.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u16);

/// Message header: identity, addressing and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Source system id.
    pub src_sys: u16,

    /// Source entity id within the source system.
    pub src_ent: u8,

    /// Destination system id, [`SYS_NONE`] for broadcast.
    pub dst_sys: u16,

    /// Destination entity id, [`ENT_NONE`] for any.
    pub dst_ent: u8,

    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

/// A message: header plus typed payload.
///
/// Messages are value-copied on publish; receivers always observe an
/// immutable snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub header: Header,
    pub payload: Payload,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The typed payload of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    // Navigation
    EstimatedState(EstimatedState),
    Distance(Distance),
    NavigationUncertainty(NavigationUncertainty),

    // Guidance
    DesiredPath(DesiredPath),
    DesiredZ(DesiredZ),
    DesiredSpeed(DesiredSpeed),
    DesiredHeading(DesiredHeading),
    PathControlState(PathControlState),
    Brake(Brake),

    // Vehicle supervision
    ControlLoops(ControlLoops),
    VehicleCommand(VehicleCommand),
    VehicleState(VehicleState),
    Calibration(Calibration),
    PlanControl(PlanControl),
    EntityState(EntityState),
    EntityMonitoringState(EntityMonitoringState),
    Abort,

    // Maneuvering
    ManeuverControlState(ManeuverControlState),
    StopManeuver,
    IdleManeuver(IdleManeuver),
    Loiter(Loiter),
    StationKeeping(StationKeeping),
    Goto(Goto),
    Teleoperation(Teleoperation),
}

// ---------------------------------------------------------------------------
// MESSAGE ID TABLE
// ---------------------------------------------------------------------------

/// One row per catalog entry: (id, abbreviated name).
const CATALOG: &[(MessageId, &str)] = &[
    (MessageId::ENTITY_STATE, "EntityState"),
    (MessageId::DISTANCE, "Distance"),
    (MessageId::ESTIMATED_STATE, "EstimatedState"),
    (MessageId::NAVIGATION_UNCERTAINTY, "NavigationUncertainty"),
    (MessageId::DESIRED_HEADING, "DesiredHeading"),
    (MessageId::DESIRED_Z, "DesiredZ"),
    (MessageId::DESIRED_SPEED, "DesiredSpeed"),
    (MessageId::DESIRED_PATH, "DesiredPath"),
    (MessageId::PATH_CONTROL_STATE, "PathControlState"),
    (MessageId::BRAKE, "Brake"),
    (MessageId::GOTO, "Goto"),
    (MessageId::TELEOPERATION, "Teleoperation"),
    (MessageId::LOITER, "Loiter"),
    (MessageId::STATION_KEEPING, "StationKeeping"),
    (MessageId::IDLE_MANEUVER, "IdleManeuver"),
    (MessageId::STOP_MANEUVER, "StopManeuver"),
    (MessageId::MANEUVER_CONTROL_STATE, "ManeuverControlState"),
    (MessageId::VEHICLE_STATE, "VehicleState"),
    (MessageId::VEHICLE_COMMAND, "VehicleCommand"),
    (MessageId::ENTITY_MONITORING_STATE, "EntityMonitoringState"),
    (MessageId::CALIBRATION, "Calibration"),
    (MessageId::CONTROL_LOOPS, "ControlLoops"),
    (MessageId::ABORT, "Abort"),
    (MessageId::PLAN_CONTROL, "PlanControl"),
];

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MessageId {
    pub const ENTITY_STATE: MessageId = MessageId(1);
    pub const DISTANCE: MessageId = MessageId(262);
    pub const ESTIMATED_STATE: MessageId = MessageId(350);
    pub const NAVIGATION_UNCERTAINTY: MessageId = MessageId(354);
    pub const DESIRED_HEADING: MessageId = MessageId(400);
    pub const DESIRED_Z: MessageId = MessageId(401);
    pub const DESIRED_SPEED: MessageId = MessageId(402);
    pub const DESIRED_PATH: MessageId = MessageId(406);
    pub const PATH_CONTROL_STATE: MessageId = MessageId(410);
    pub const BRAKE: MessageId = MessageId(413);
    pub const GOTO: MessageId = MessageId(450);
    pub const TELEOPERATION: MessageId = MessageId(452);
    pub const LOITER: MessageId = MessageId(453);
    pub const IDLE_MANEUVER: MessageId = MessageId(454);
    pub const STATION_KEEPING: MessageId = MessageId(461);
    pub const STOP_MANEUVER: MessageId = MessageId(468);
    pub const MANEUVER_CONTROL_STATE: MessageId = MessageId(470);
    pub const VEHICLE_STATE: MessageId = MessageId(500);
    pub const VEHICLE_COMMAND: MessageId = MessageId(501);
    pub const ENTITY_MONITORING_STATE: MessageId = MessageId(503);
    pub const CALIBRATION: MessageId = MessageId(506);
    pub const CONTROL_LOOPS: MessageId = MessageId(507);
    pub const ABORT: MessageId = MessageId(550);
    pub const PLAN_CONTROL: MessageId = MessageId(559);

    /// Resolve an abbreviated type name into an id. Returns `None` for names
    /// not in the catalog.
    pub fn from_abbrev(name: &str) -> Option<MessageId> {
        CATALOG
            .iter()
            .find(|(_, abbrev)| *abbrev == name)
            .map(|(id, _)| *id)
    }

    /// The abbreviated type name for this id, if it is in the catalog.
    pub fn abbrev(&self) -> Option<&'static str> {
        CATALOG
            .iter()
            .find(|(id, _)| id == self)
            .map(|(_, abbrev)| *abbrev)
    }
}

impl Payload {
    /// The stable type id of this payload.
    pub fn id(&self) -> MessageId {
        match self {
            Payload::EstimatedState(_) => MessageId::ESTIMATED_STATE,
            Payload::Distance(_) => MessageId::DISTANCE,
            Payload::NavigationUncertainty(_) => MessageId::NAVIGATION_UNCERTAINTY,
            Payload::DesiredPath(_) => MessageId::DESIRED_PATH,
            Payload::DesiredZ(_) => MessageId::DESIRED_Z,
            Payload::DesiredSpeed(_) => MessageId::DESIRED_SPEED,
            Payload::DesiredHeading(_) => MessageId::DESIRED_HEADING,
            Payload::PathControlState(_) => MessageId::PATH_CONTROL_STATE,
            Payload::Brake(_) => MessageId::BRAKE,
            Payload::ControlLoops(_) => MessageId::CONTROL_LOOPS,
            Payload::VehicleCommand(_) => MessageId::VEHICLE_COMMAND,
            Payload::VehicleState(_) => MessageId::VEHICLE_STATE,
            Payload::Calibration(_) => MessageId::CALIBRATION,
            Payload::PlanControl(_) => MessageId::PLAN_CONTROL,
            Payload::EntityState(_) => MessageId::ENTITY_STATE,
            Payload::EntityMonitoringState(_) => MessageId::ENTITY_MONITORING_STATE,
            Payload::Abort => MessageId::ABORT,
            Payload::ManeuverControlState(_) => MessageId::MANEUVER_CONTROL_STATE,
            Payload::StopManeuver => MessageId::STOP_MANEUVER,
            Payload::IdleManeuver(_) => MessageId::IDLE_MANEUVER,
            Payload::Loiter(_) => MessageId::LOITER,
            Payload::StationKeeping(_) => MessageId::STATION_KEEPING,
            Payload::Goto(_) => MessageId::GOTO,
            Payload::Teleoperation(_) => MessageId::TELEOPERATION,
        }
    }

    /// The abbreviated type name of this payload.
    pub fn abbrev(&self) -> &'static str {
        // Every Payload variant has a catalog row
        self.id().abbrev().unwrap_or("Unknown")
    }
}

impl Default for Header {
    fn default() -> Self {
        Self {
            src_sys: SYS_NONE,
            src_ent: ENT_NONE,
            dst_sys: SYS_NONE,
            dst_ent: ENT_NONE,
            timestamp: 0.0,
        }
    }
}

impl Message {
    /// Build a message with a default (unstamped, broadcast) header.
    pub fn new(payload: Payload) -> Self {
        Self {
            header: Header::default(),
            payload,
        }
    }

    /// The stable type id of this message's payload.
    pub fn id(&self) -> MessageId {
        self.payload.id()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_abbrev_round_trip() {
        for (id, abbrev) in CATALOG {
            assert_eq!(MessageId::from_abbrev(abbrev), Some(*id));
            assert_eq!(id.abbrev(), Some(*abbrev));
        }

        assert_eq!(MessageId::from_abbrev("NoSuchMessage"), None);
    }

    #[test]
    fn test_catalog_ids_unique() {
        for (i, (id_a, _)) in CATALOG.iter().enumerate() {
            for (id_b, _) in &CATALOG[i + 1..] {
                assert_ne!(id_a, id_b);
            }
        }
    }

    #[test]
    fn test_payload_ids_match_catalog() {
        let msg = Message::new(Payload::Abort);
        assert_eq!(msg.id(), MessageId::ABORT);
        assert_eq!(msg.payload.abbrev(), "Abort");

        let msg = Message::new(Payload::EstimatedState(EstimatedState::default()));
        assert_eq!(msg.id(), MessageId::ESTIMATED_STATE);
    }

    #[test]
    fn test_message_serde() {
        let msg = Message::new(Payload::DesiredZ(DesiredZ {
            value: 2.0,
            z_units: ZUnits::Depth,
        }));

        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
