//! Path controller scenario tests: reference projection, divergence
//! monitors, replay idempotency and loiter entry.

mod common;

use auv_exec::config::TaskSection;
use auv_exec::control::path::{LosSteering, PathControl};
use auv_exec::task::Task;
use bus_if::msg::vehicle::EntityHealth;
use bus_if::msg::*;
use common::{msg, Harness};
use util::maths;

const LAT: f64 = 0.7188;
const LON: f64 = -0.152;

fn controller(h: &Harness, section: &TaskSection) -> PathControl {
    let mut pc = PathControl::new(h.ctx("Path Controller"), Box::new(LosSteering::new(10.0)));
    h.init(&mut pc, section);
    pc
}

fn activate(pc: &mut PathControl) {
    pc.consume(&msg(Payload::ControlLoops(ControlLoops {
        enable: true,
        mask: ControlLoopMask::PATH,
    })));
    assert!(pc.is_active());
}

fn estate(x: f64, y: f64, vx: f64, vy: f64) -> Message {
    msg(Payload::EstimatedState(EstimatedState {
        lat: LAT,
        lon: LON,
        x,
        y,
        vx,
        vy,
        depth: 2.0,
        z: 2.0,
        alt: 20.0,
        ..Default::default()
    }))
}

/// A straight track due north of the given length, starting at the origin.
fn north_path(length_m: f64, end_z: f64) -> Message {
    let (end_lat, end_lon) = maths::wgs84_displace(LAT, LON, length_m, 0.0);

    msg(Payload::DesiredPath(DesiredPath {
        start_lat: LAT,
        start_lon: LON,
        start_z: 0.0,
        start_z_units: ZUnits::Depth,
        end_lat,
        end_lon,
        end_z,
        end_z_units: ZUnits::Depth,
        speed: 1.5,
        speed_units: SpeedUnits::MetersPs,
        lradius: 0.0,
        flags: DesiredPathFlags::START,
    }))
}

#[test]
fn desired_path_rejected_while_inactive() {
    let h = Harness::new();
    let mut pc = controller(&h, &TaskSection::default());

    pc.consume(&estate(0.0, 0.0, 0.0, 0.0));
    h.drain();

    pc.consume(&north_path(100.0, 2.0));

    let out = h.drain();
    assert!(out
        .iter()
        .all(|m| !matches!(m.payload, Payload::PathControlState(_))));
    assert!(out
        .iter()
        .all(|m| !matches!(m.payload, Payload::DesiredSpeed(_))));
}

#[test]
fn desired_path_projection_and_references() {
    let h = Harness::new();
    let mut pc = controller(&h, &TaskSection::default());

    activate(&mut pc);
    pc.consume(&estate(0.0, 0.0, 0.0, 0.0));
    h.drain();

    // Track due north; expected length comes from the same WGS-84 model
    let length = 637.0;
    pc.consume(&north_path(length, 2.0));

    let ts = pc.tracking_state();
    assert!(ts.track_bearing.abs() < 1e-6);
    assert!((ts.track_length - length).abs() < 0.01);

    let out = h.drain();

    // One speed reference
    let speeds: Vec<_> = out
        .iter()
        .filter_map(|m| match m.payload {
            Payload::DesiredSpeed(ref s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(speeds.len(), 1);
    assert_eq!(speeds[0].value, 1.5);
    assert_eq!(speeds[0].speed_units, SpeedUnits::MetersPs);

    // One vertical reference in depth
    let zs: Vec<_> = out
        .iter()
        .filter_map(|m| match m.payload {
            Payload::DesiredZ(ref z) => Some(z),
            _ => None,
        })
        .collect();
    assert_eq!(zs.len(), 1);
    assert_eq!(zs[0].value, 2.0);
    assert_eq!(zs[0].z_units, ZUnits::Depth);

    // Speed and depth loops enabled, altitude never enabled
    let mut enabled = ControlLoopMask::NONE;
    for m in &out {
        if let Payload::ControlLoops(ref cl) = m.payload {
            assert!(cl.enable);
            enabled.insert(cl.mask);
        }
    }
    assert!(enabled.contains(ControlLoopMask::SPEED));
    assert!(enabled.contains(ControlLoopMask::DEPTH));
    assert!(!enabled.intersects(ControlLoopMask::ALTITUDE));

    // Exactly one path control state, with the new start/end
    let states: Vec<_> = out
        .iter()
        .filter_map(|m| match m.payload {
            Payload::PathControlState(ref p) => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].start_lat, LAT);
    assert!((states[0].x - length).abs() < 0.01);
}

#[test]
fn along_track_divergence_aborts_after_two_checks() {
    let h = Harness::new();
    let mut pc = controller(&h, &TaskSection::default());

    activate(&mut pc);
    pc.consume(&estate(0.0, 0.0, 0.0, 0.0));
    pc.consume(&north_path(1000.0, 2.0));
    h.drain();

    // Hold position at the track start with a small forward course; the
    // along-track monitor expects period * min_speed of progress
    let mut diverged_at = None;

    for step in 1..=31 {
        h.clock.advance(1.0);
        pc.consume(&estate(0.0, 0.0, 0.1, 0.0));

        if pc.in_error() {
            diverged_at = Some(step);
            break;
        }
    }

    // First check at 15 s flags divergence, the second at 30 s aborts
    assert_eq!(diverged_at, Some(30));

    let out = h.drain();
    assert!(out.iter().any(|m| matches!(
        m.payload,
        Payload::EntityState(ref es)
            if es.state == EntityHealth::Error
                && es.description.contains("along-track divergence")
    )));
}

#[test]
fn cross_track_divergence_after_time_limit() {
    let h = Harness::new();
    let section = TaskSection::from_toml(
        "Path Controller",
        "along_track = { monitor = false }\n\
         cross_track = { monitor = true, distance_limit_m = 15.0, time_limit_s = 10.0 }",
    )
    .unwrap();
    let mut pc = controller(&h, &section);

    activate(&mut pc);
    pc.consume(&estate(0.0, 0.0, 0.0, 0.0));
    pc.consume(&north_path(1000.0, 2.0));
    h.drain();

    // 20 m off the track, moving along it
    h.clock.advance(1.0);
    pc.consume(&estate(100.0, 20.0, 1.0, 0.0));
    assert!(!pc.in_error());

    // Still outside the band after the time limit
    h.clock.advance(11.0);
    pc.consume(&estate(110.0, 20.0, 1.0, 0.0));
    assert!(pc.in_error());
}

#[test]
fn cross_track_recovers_inside_band() {
    let h = Harness::new();
    let section =
        TaskSection::from_toml("Path Controller", "along_track = { monitor = false }").unwrap();
    let mut pc = controller(&h, &section);

    activate(&mut pc);
    pc.consume(&estate(0.0, 0.0, 0.0, 0.0));
    pc.consume(&north_path(1000.0, 2.0));

    h.clock.advance(1.0);
    pc.consume(&estate(100.0, 20.0, 1.0, 0.0));

    // Back inside the band before the time limit: no error, ever
    h.clock.advance(5.0);
    pc.consume(&estate(150.0, 5.0, 1.0, 0.0));

    h.clock.advance(30.0);
    pc.consume(&estate(400.0, 5.0, 1.0, 0.0));
    assert!(!pc.in_error());
}

#[test]
fn replayed_estimated_state_is_idempotent() {
    let h = Harness::new();
    let mut pc = controller(&h, &TaskSection::default());

    activate(&mut pc);
    pc.consume(&estate(0.0, 0.0, 0.0, 0.0));
    pc.consume(&north_path(1000.0, 2.0));

    h.clock.advance(1.0);
    pc.consume(&estate(10.0, 0.0, 1.0, 0.0));
    h.drain();

    // The identical message replayed within the same control period
    // produces no further output
    pc.consume(&estate(10.0, 0.0, 1.0, 0.0));

    let out = h.drain();
    assert!(out.is_empty(), "replay produced {} messages", out.len());
}

#[test]
fn nearby_without_new_reference_is_an_error() {
    let h = Harness::new();
    let mut pc = controller(&h, &TaskSection::default());

    activate(&mut pc);
    pc.consume(&estate(0.0, 0.0, 0.0, 0.0));
    pc.consume(&north_path(100.0, 2.0));
    h.drain();

    // Arrive at the end point: the nearby flag latches
    h.clock.advance(1.0);
    pc.consume(&estate(99.0, 0.0, 1.0, 0.0));
    assert!(pc.tracking_state().nearby);

    let out = h.drain();
    assert!(out.iter().any(|m| matches!(
        m.payload,
        Payload::PathControlState(ref p) if p.flags.contains(PathCtrlFlags::NEAR)
    )));

    // No fresh reference within the timeout
    h.clock.advance(6.0);
    pc.consume(&estate(99.0, 0.0, 1.0, 0.0));
    assert!(pc.in_error());
}

#[test]
fn loiter_entry_at_path_end() {
    let h = Harness::new();
    let mut pc = controller(&h, &TaskSection::default());

    activate(&mut pc);
    pc.consume(&estate(0.0, 0.0, 0.0, 0.0));

    // Loiter of radius 50 around a point 200 m north
    let (end_lat, end_lon) = maths::wgs84_displace(LAT, LON, 200.0, 0.0);
    pc.consume(&msg(Payload::DesiredPath(DesiredPath {
        end_lat,
        end_lon,
        end_z: 2.0,
        end_z_units: ZUnits::Depth,
        speed: 1.5,
        speed_units: SpeedUnits::MetersPs,
        lradius: 50.0,
        ..Default::default()
    })));

    // The effective end point is offset onto the circle
    let (end_x, end_y) = {
        let ts = pc.tracking_state();
        assert!((ts.loiter.center.x - 200.0).abs() < 0.1);
        assert!((ts.loiter.radius - 50.0).abs() < 1e-9);
        assert!(ts.loiter.clockwise);
        (ts.end.x, ts.end.y)
    };
    h.drain();

    // Approach the track end: nearby fires, then loitering engages
    h.clock.advance(1.0);
    pc.consume(&estate(end_x - 1.0, end_y, 1.0, 0.0));

    let ts = pc.tracking_state();
    assert!(ts.loitering);
    assert!(!ts.nearby);

    // The next report carries the loitering flag
    h.clock.advance(1.0);
    pc.consume(&estate(150.0, 0.0, 1.0, 0.0));

    let out = h.drain();
    assert!(out.iter().any(|m| matches!(
        m.payload,
        Payload::PathControlState(ref p)
            if p.flags.contains(PathCtrlFlags::LOITERING) && p.lradius == 50.0
    )));

    // While loitering a heading reference keeps being produced
    assert!(out
        .iter()
        .any(|m| matches!(m.payload, Payload::DesiredHeading(_))));
}
