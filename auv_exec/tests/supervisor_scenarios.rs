//! Vehicle supervisor scenario tests: maneuver start, entity faults,
//! non-overridable external overrides, aborts and calibration timing.

mod common;

use auv_exec::config::TaskSection;
use auv_exec::supervisor::Supervisor;
use auv_exec::task::Task;
use bus_if::msg::*;
use common::{msg, msg_from_self, Harness};

fn supervisor(h: &Harness) -> Supervisor {
    let mut sup = Supervisor::new(h.ctx("Vehicle Supervisor"));
    h.init(&mut sup, &TaskSection::default());
    sup
}

fn loiter_maneuver() -> Payload {
    Payload::Loiter(Loiter {
        lat: 0.7188,
        lon: -0.152,
        z: 2.0,
        z_units: ZUnits::Depth,
        radius: 50.0,
        speed: 1.0,
        speed_units: SpeedUnits::MetersPs,
        direction: LoiterDirection::Clockwise,
        duration: 0,
    })
}

fn exec_maneuver_cmd(request_id: u16) -> Message {
    msg(Payload::VehicleCommand(VehicleCommand {
        command_type: VcType::Request,
        command: VcCommand::ExecManeuver,
        request_id,
        maneuver: Some(Box::new(loiter_maneuver())),
        calib_time: 0,
        info: String::new(),
    }))
}

fn entity_errors(ecount: u8, enames: &str, time: f64) -> Message {
    msg(Payload::EntityMonitoringState(EntityMonitoringState {
        ccount: 0,
        cnames: String::new(),
        ecount,
        enames: enames.into(),
        last_error: if ecount > 0 { "failed".into() } else { String::new() },
        last_error_time: time,
    }))
}

fn replies(messages: &[Message]) -> Vec<&VehicleCommand> {
    messages
        .iter()
        .filter_map(|m| match m.payload {
            Payload::VehicleCommand(ref vc) if vc.command_type != VcType::Request => Some(vc),
            _ => None,
        })
        .collect()
}

#[test]
fn maneuver_start_happy_path() {
    let h = Harness::new();
    let mut sup = supervisor(&h);

    sup.consume(&exec_maneuver_cmd(42));

    let out = h.drain();

    // One idempotent StopManeuver
    assert_eq!(
        out.iter()
            .filter(|m| matches!(m.payload, Payload::StopManeuver))
            .count(),
        1
    );

    // The maneuver is published as a clone
    assert!(out
        .iter()
        .any(|m| matches!(m.payload, Payload::Loiter(ref l) if l.radius == 50.0)));

    // Mode is now maneuver
    let vs = out
        .iter()
        .rev()
        .find_map(|m| match m.payload {
            Payload::VehicleState(ref vs) => Some(vs),
            _ => None,
        })
        .expect("no vehicle state published");
    assert_eq!(vs.op_mode, OpMode::Maneuver);
    assert_eq!(vs.maneuver_type, MessageId::LOITER.0);

    // Exactly one reply, success, carrying the request id
    let rs = replies(&out);
    assert_eq!(rs.len(), 1);
    assert_eq!(rs[0].command_type, VcType::Success);
    assert_eq!(rs[0].request_id, 42);
    assert_eq!(rs[0].info, "Loiter maneuver started");
}

#[test]
fn every_request_gets_exactly_one_reply() {
    let h = Harness::new();
    let mut sup = supervisor(&h);

    // A request with no maneuver payload is refused but still answered
    for (id, maneuver) in [(1u16, None), (2u16, Some(Box::new(loiter_maneuver())))] {
        sup.consume(&msg(Payload::VehicleCommand(VehicleCommand {
            command_type: VcType::Request,
            command: VcCommand::ExecManeuver,
            request_id: id,
            maneuver,
            calib_time: 0,
            info: String::new(),
        })));

        let out = h.drain();
        let rs = replies(&out);
        assert_eq!(rs.len(), 1, "request {} got {} replies", id, rs.len());
        assert_eq!(rs[0].request_id, id);
    }
}

#[test]
fn entity_fault_in_maneuver_enters_error_then_recovers() {
    let h = Harness::new();
    let mut sup = supervisor(&h);

    sup.consume(&exec_maneuver_cmd(1));
    h.drain();

    // S5: entity error outside a safe plan
    sup.consume(&entity_errors(1, "IMU", 10.0));

    let out = h.drain();
    assert!(out
        .iter()
        .any(|m| matches!(m.payload, Payload::StopManeuver)));
    assert!(out
        .iter()
        .any(|m| matches!(m.payload, Payload::IdleManeuver(_))));

    assert_eq!(sup.vehicle_state().op_mode, OpMode::Error);
    assert!(sup.vehicle_state().control_loops.is_empty());
    assert_eq!(sup.vehicle_state().error_ents, "IMU");

    // Errors clear: back to service
    sup.consume(&entity_errors(0, "", 11.0));
    assert_eq!(sup.vehicle_state().op_mode, OpMode::Service);
}

#[test]
fn safe_plan_ignores_unlisted_entity_errors() {
    let h = Harness::new();
    let mut sup = Supervisor::new(h.ctx("Vehicle Supervisor"));
    let section = TaskSection::from_toml("Vehicle Supervisor", "safe_entities = [\"CTD\"]").unwrap();
    h.init(&mut sup, &section);

    sup.consume(&exec_maneuver_cmd(1));
    h.drain();

    // Start a plan that ignores errors
    sup.consume(&msg(Payload::PlanControl(PlanControl {
        command_type: PcType::Request,
        op: PcOp::Start,
        plan_id: "survey".into(),
        flags: PlanControlFlags::IGNORE_ERRORS,
    })));

    // An error on an entity outside the safe set is tolerated
    sup.consume(&entity_errors(1, "Camera", 10.0));
    assert_eq!(sup.vehicle_state().op_mode, OpMode::Maneuver);

    // An error on a safe-listed entity still trips error mode
    sup.consume(&entity_errors(1, "CTD", 11.0));
    assert_eq!(sup.vehicle_state().op_mode, OpMode::Error);
}

#[test]
fn teleoperation_overrides_error_mode() {
    let h = Harness::new();
    let mut sup = supervisor(&h);

    // Enter error mode from service
    sup.consume(&entity_errors(1, "IMU", 5.0));
    assert_eq!(sup.vehicle_state().op_mode, OpMode::Error);
    h.drain();

    // S6: non-overridable loops force external mode, never stuck in error
    sup.consume(&msg(Payload::ControlLoops(ControlLoops {
        enable: true,
        mask: ControlLoopMask::TELEOPERATION,
    })));

    assert_eq!(sup.vehicle_state().op_mode, OpMode::External);

    // Loops dropping to zero returns to service, or error while faults
    // persist
    sup.consume(&msg(Payload::ControlLoops(ControlLoops {
        enable: false,
        mask: ControlLoopMask::TELEOPERATION,
    })));
    assert_eq!(sup.vehicle_state().op_mode, OpMode::Error);

    sup.consume(&entity_errors(0, "", 6.0));
    assert_eq!(sup.vehicle_state().op_mode, OpMode::Service);
}

#[test]
fn abort_always_lands_in_service_or_error() {
    let h = Harness::new();
    let mut sup = supervisor(&h);

    // From maneuver mode
    sup.consume(&exec_maneuver_cmd(1));
    sup.consume(&msg(Payload::Abort));
    assert_eq!(sup.vehicle_state().op_mode, OpMode::Service);

    // From external mode with overridable loops
    sup.consume(&msg(Payload::ControlLoops(ControlLoops {
        enable: true,
        mask: ControlLoopMask::SPEED,
    })));
    assert_eq!(sup.vehicle_state().op_mode, OpMode::External);
    sup.consume(&msg(Payload::Abort));
    assert_eq!(sup.vehicle_state().op_mode, OpMode::Service);
}

#[test]
fn calibration_lifecycle_and_timer() {
    let h = Harness::new();
    let mut sup = supervisor(&h);

    sup.consume(&msg(Payload::VehicleCommand(VehicleCommand {
        command_type: VcType::Request,
        command: VcCommand::StartCalibration,
        request_id: 9,
        maneuver: None,
        calib_time: 10,
        info: String::new(),
    })));

    assert_eq!(sup.vehicle_state().op_mode, OpMode::Calibration);

    let out = h.drain();
    assert!(out
        .iter()
        .any(|m| matches!(m.payload, Payload::Calibration(ref c) if c.duration == 10)));
    assert_eq!(replies(&out).len(), 1);

    // Not yet expired
    h.clock.advance(5.0);
    sup.tick();
    assert_eq!(sup.vehicle_state().op_mode, OpMode::Calibration);

    // Expired
    h.clock.advance(6.0);
    sup.tick();
    assert_eq!(sup.vehicle_state().op_mode, OpMode::Service);
}

#[test]
fn maneuver_to_calibration_passes_through_service() {
    let h = Harness::new();
    let mut sup = supervisor(&h);

    sup.consume(&exec_maneuver_cmd(1));
    h.drain();

    sup.consume(&msg(Payload::VehicleCommand(VehicleCommand {
        command_type: VcType::Request,
        command: VcCommand::StartCalibration,
        request_id: 2,
        maneuver: None,
        calib_time: 5,
        info: String::new(),
    })));

    assert_eq!(sup.vehicle_state().op_mode, OpMode::Calibration);

    // The published mode sequence passed through service
    let modes: Vec<OpMode> = h
        .drain()
        .iter()
        .filter_map(|m| match m.payload {
            Payload::VehicleState(ref vs) => Some(vs.op_mode),
            _ => None,
        })
        .collect();
    assert!(modes.contains(&OpMode::Service));
    assert_eq!(*modes.last().unwrap(), OpMode::Calibration);
}

#[test]
fn maneuver_done_window_times_out_to_service() {
    let h = Harness::new();
    let mut sup = supervisor(&h);

    sup.consume(&exec_maneuver_cmd(1));
    h.drain();

    // The maneuver reports completion
    sup.consume(&msg_from_self(Payload::ManeuverControlState(
        ManeuverControlState {
            state: McsState::Done,
            eta: 0,
            info: String::new(),
        },
    )));

    assert!(sup
        .vehicle_state()
        .flags
        .contains(VehicleStateFlags::MANEUVER_DONE));
    assert_eq!(sup.vehicle_state().op_mode, OpMode::Maneuver);

    // No new reference arrives within the window
    h.clock.advance(1.5);
    sup.tick();
    assert_eq!(sup.vehicle_state().op_mode, OpMode::Service);
}

#[test]
fn maneuver_error_resets_to_service() {
    let h = Harness::new();
    let mut sup = supervisor(&h);

    sup.consume(&exec_maneuver_cmd(1));
    h.drain();

    sup.consume(&msg_from_self(Payload::ManeuverControlState(
        ManeuverControlState {
            state: McsState::Error,
            eta: 0,
            info: "thruster stalled".into(),
        },
    )));

    assert_eq!(sup.vehicle_state().op_mode, OpMode::Service);
    assert!(sup.vehicle_state().last_error.contains("thruster stalled"));
}

#[test]
fn control_loop_mask_tracks_union_and_difference() {
    let h = Harness::new();
    let mut sup = supervisor(&h);

    sup.consume(&msg(Payload::ControlLoops(ControlLoops {
        enable: true,
        mask: ControlLoopMask::SPEED.union(ControlLoopMask::DEPTH),
    })));
    sup.consume(&msg(Payload::ControlLoops(ControlLoops {
        enable: true,
        mask: ControlLoopMask::PATH,
    })));
    sup.consume(&msg(Payload::ControlLoops(ControlLoops {
        enable: false,
        mask: ControlLoopMask::DEPTH,
    })));

    let expected = ControlLoopMask::SPEED.union(ControlLoopMask::PATH);
    assert_eq!(sup.vehicle_state().control_loops, expected);
}
