//! Bottom tracker scenario tests: avoidance braking, depth-limit forcing
//! and recovery to tracking.

mod common;

use auv_exec::control::bottom::{BottomTracker, BtArgs, BtState, EntityDispatcher};
use bus_if::msg::*;
use common::Harness;

fn args() -> BtArgs {
    BtArgs {
        entity: 5,
        fsamples: 5,
        safe_pitch: 15.0_f64.to_radians(),
        slope_hyst: 1.5_f64.to_radians(),
        min_alt: 1.0,
        min_range: 4.0,
        alt_tol: 2.0,
        depth_tol: 1.0,
        depth_limit: 48.0,
        check_trend: true,
        control_period: 0.2,
    }
}

fn tracker(h: &Harness) -> BottomTracker {
    let disp = EntityDispatcher::new(
        h.bus.clone(),
        h.clock.clone(),
        5,
        bus_if::bus::Inbox::default().id(),
    );

    let mut bt = BottomTracker::new(args(), disp);
    bt.activate();
    bt
}

fn estate(alt: f64, depth: f64) -> EstimatedState {
    EstimatedState {
        alt,
        depth,
        ..Default::default()
    }
}

fn feed(h: &Harness, bt: &mut BottomTracker, es: &EstimatedState) {
    h.clock.advance(0.3);
    bt.on_estimated_state(es).expect("tracker error");
}

/// Put an active tracker into Tracking with a 3 m altitude reference.
fn to_tracking(h: &Harness, bt: &mut BottomTracker) {
    bt.on_desired_z(
        &DesiredZ {
            value: 3.0,
            z_units: ZUnits::Altitude,
        },
        true,
    );
    bt.on_desired_speed(&DesiredSpeed {
        value: 1.0,
        speed_units: SpeedUnits::MetersPs,
    });

    feed(h, bt, &estate(5.0, 5.0));
    assert_eq!(bt.state(), BtState::Tracking);
}

fn brakes(h: &Harness) -> Vec<BrakeOp> {
    h.drain()
        .iter()
        .filter_map(|m| match m.payload {
            Payload::Brake(ref b) => Some(b.op),
            _ => None,
        })
        .collect()
}

#[test]
fn idle_until_reference_and_speed_present() {
    let h = Harness::new();
    let mut bt = tracker(&h);

    // No reference, no speed: nothing moves
    feed(&h, &mut bt, &estate(5.0, 5.0));
    assert_eq!(bt.state(), BtState::Idle);

    // Altitude reference alone is not enough
    bt.on_desired_z(
        &DesiredZ {
            value: 3.0,
            z_units: ZUnits::Altitude,
        },
        true,
    );
    feed(&h, &mut bt, &estate(5.0, 5.0));
    assert_eq!(bt.state(), BtState::Idle);

    // With a positive speed the machine engages
    bt.on_desired_speed(&DesiredSpeed {
        value: 1.0,
        speed_units: SpeedUnits::MetersPs,
    });
    feed(&h, &mut bt, &estate(5.0, 5.0));
    assert_eq!(bt.state(), BtState::Tracking);
}

#[test]
fn outgoing_z_passes_through_while_tracking() {
    let h = Harness::new();
    let mut bt = tracker(&h);
    h.drain();

    bt.on_desired_z(
        &DesiredZ {
            value: 3.0,
            z_units: ZUnits::Altitude,
        },
        true,
    );

    // While not overriding, the reference goes to the bus
    let out = h.drain();
    assert!(out
        .iter()
        .any(|m| matches!(m.payload, Payload::DesiredZ(ref z) if z.value == 3.0)));
}

#[test]
fn low_altitude_brakes_and_recovers() {
    let h = Harness::new();
    let mut bt = tracker(&h);

    to_tracking(&h, &mut bt);
    h.drain();

    // Forward range closes in and the altitude drops below the minimum
    bt.on_distance(&Distance {
        value: 0.5,
        validity: DistanceValidity::Valid,
    });
    feed(&h, &mut bt, &estate(0.8, 5.0));

    assert_eq!(bt.state(), BtState::Avoiding);
    assert_eq!(brakes(&h), vec![BrakeOp::Start]);

    // Buoyancy brings the vehicle back above the reference and the slope
    // reads safe again
    for _ in 0..5 {
        bt.on_distance(&Distance {
            value: 60.0,
            validity: DistanceValidity::Valid,
        });
    }
    feed(&h, &mut bt, &estate(3.2, 5.0));

    assert_eq!(bt.state(), BtState::Tracking);

    let out = h.drain();
    let ops: Vec<BrakeOp> = out
        .iter()
        .filter_map(|m| match m.payload {
            Payload::Brake(ref b) => Some(b.op),
            _ => None,
        })
        .collect();
    assert_eq!(ops, vec![BrakeOp::Stop]);

    // The original altitude reference is re-dispatched
    assert!(out.iter().any(|m| matches!(
        m.payload,
        Payload::DesiredZ(ref z) if z.value == 3.0 && z.z_units == ZUnits::Altitude
    )));
}

#[test]
fn depth_limit_forces_depth_control() {
    let h = Harness::new();
    let mut bt = tracker(&h);

    to_tracking(&h, &mut bt);
    h.drain();

    // Vehicle bottom projected depth exceeds the limit plus hysteresis:
    // 46 + 6 - 3 = 49 > 48.5
    feed(&h, &mut bt, &estate(6.0, 46.0));

    assert_eq!(bt.state(), BtState::Depth);

    let out = h.drain();
    assert!(out.iter().any(|m| matches!(
        m.payload,
        Payload::DesiredZ(ref z) if z.value == 48.0 && z.z_units == ZUnits::Depth
    )));

    // Terrain falls away: back to the altitude reference
    feed(&h, &mut bt, &estate(4.0, 40.0));
    assert_eq!(bt.state(), BtState::Tracking);

    let out = h.drain();
    assert!(out.iter().any(|m| matches!(
        m.payload,
        Payload::DesiredZ(ref z) if z.value == 3.0 && z.z_units == ZUnits::Altitude
    )));
}

#[test]
fn steep_slope_dispatches_safe_depth() {
    let h = Harness::new();
    let mut bt = tracker(&h);

    to_tracking(&h, &mut bt);
    h.drain();

    // A wall ahead: range 8 m at altitude 5 m is far steeper than the safe
    // pitch, but above the minimum range
    for _ in 0..5 {
        bt.on_distance(&Distance {
            value: 8.0,
            validity: DistanceValidity::Valid,
        });
    }
    feed(&h, &mut bt, &estate(5.0, 20.0));

    assert_eq!(bt.state(), BtState::Unsafe);

    // Safe depth = depth at the slope top minus the altitude reference:
    // 20 - 3 = 17 (level vehicle)
    let out = h.drain();
    assert!(out.iter().any(|m| matches!(
        m.payload,
        Payload::DesiredZ(ref z)
            if z.z_units == ZUnits::Depth && (z.value - 17.0).abs() < 1e-6
    )));
}

#[test]
fn avoiding_without_valid_altitude_is_an_error() {
    let h = Harness::new();
    let mut bt = tracker(&h);

    to_tracking(&h, &mut bt);

    // Brake into avoiding
    feed(&h, &mut bt, &estate(0.5, 5.0));
    assert_eq!(bt.state(), BtState::Avoiding);

    // Altitude measurement lost entirely
    h.clock.advance(0.3);
    let result = bt.on_estimated_state(&estate(-1.0, 0.2));
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("unable to avoid"));
}

#[test]
fn deactivated_tracker_never_dispatches() {
    let h = Harness::new();
    let mut bt = tracker(&h);

    to_tracking(&h, &mut bt);
    bt.deactivate();
    h.drain();

    feed(&h, &mut bt, &estate(0.5, 5.0));
    assert!(h.drain().is_empty());
}
