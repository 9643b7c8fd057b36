//! End-to-end pick scenarios against the mock backend

use std::thread;
use std::time::Duration;

use approx::assert_relative_eq;
use pandasim_core::config::CameraConfig;
use pandasim_core::math::distance3;
use pandasim_core::robot::HOME_CONFIGURATION;
use pandasim_core::{
    CancelToken, Error, GraspMethod, GraspState, MockBackend, SessionConfig, SessionStatus,
    SimSession,
};

const CUBE: [f64; 3] = [0.55, 0.0, 0.025];
const ABOVE_CUBE: [f64; 3] = [0.55, 0.0, 0.08];

fn session() -> SimSession<MockBackend> {
    SimSession::new(MockBackend::new(), SessionConfig::default()).unwrap()
}

fn ee_position(sim: &SimSession<MockBackend>) -> [f64; 3] {
    sim.end_effector_pose().unwrap().position
}

fn object_position(sim: &SimSession<MockBackend>) -> [f64; 3] {
    sim.object_pose().unwrap().unwrap().position
}

#[test]
fn test_pick_and_place_by_proximity() {
    let mut sim = session();
    sim.spawn_object(CUBE).unwrap();

    sim.move_cartesian(&ABOVE_CUBE, None, 1.0).unwrap();
    let ee = ee_position(&sim);
    assert!(distance3(ee, CUBE) < 0.08);

    let outcome = sim.close_and_auto_grasp(0.0).unwrap();
    assert!(outcome.grasped);
    assert_eq!(outcome.method, Some(GraspMethod::Proximity));
    assert_relative_eq!(outcome.width, 0.0);
    assert_eq!(sim.grasp_state(), GraspState::Grasped);

    // Lift: the welded cube follows the hand
    sim.move_cartesian(&[0.55, 0.0, 0.3], None, 1.0).unwrap();
    let lifted = object_position(&sim);
    assert!(lifted[2] > 0.2, "cube should be lifted, got {lifted:?}");
    assert!(distance3(lifted, ee_position(&sim)) < 0.05);

    // Place elsewhere and let go
    sim.move_cartesian(&[0.4, 0.2, 0.1], None, 1.0).unwrap();
    sim.release().unwrap();
    assert_eq!(sim.grasp_state(), GraspState::Released);
    let placed = object_position(&sim);

    // Moving away no longer carries the cube
    sim.move_joints(&HOME_CONFIGURATION, 1.0).unwrap();
    let after = object_position(&sim);
    assert!(distance3(placed, after) < 1e-12);
}

#[test]
fn test_far_grasp_is_assisted() {
    let mut sim = session();
    sim.spawn_object(CUBE).unwrap();
    assert!(distance3(ee_position(&sim), CUBE) > 0.08);

    let outcome = sim.close_and_auto_grasp(0.0).unwrap();
    assert!(outcome.grasped);
    assert_eq!(outcome.method, Some(GraspMethod::Assisted));
    assert_eq!(sim.backend().constraint_count(), 1);

    let cube = object_position(&sim);
    assert!(distance3(cube, CUBE) > 0.1, "cube should have been snapped");
    assert!(distance3(cube, ee_position(&sim)) < 0.1);
}

#[test]
fn test_wrong_length_target_changes_nothing() {
    let mut sim = session();
    sim.spawn_object(CUBE).unwrap();
    let joints = sim.joint_positions().unwrap();
    let log = sim.pose_log().entries();
    let ticks = sim.backend().step_count();

    for target in [vec![0.0; 6], vec![0.0; 8], vec![]] {
        match sim.move_joints(&target, 1.0) {
            Err(Error::InvalidArgument(msg)) => assert!(msg.contains("length 7")),
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }

    assert_eq!(sim.joint_positions().unwrap(), joints);
    assert_eq!(sim.pose_log().entries(), log);
    assert_eq!(sim.backend().step_count(), ticks);
}

#[test]
fn test_force_grasp_twice_and_release_twice() {
    let mut sim = session();
    sim.spawn_object(CUBE).unwrap();
    assert!(sim.force_grasp().unwrap());
    assert!(sim.force_grasp().unwrap());
    assert_eq!(sim.backend().constraint_count(), 1);

    sim.release().unwrap();
    sim.release().unwrap();
    assert_eq!(sim.backend().constraint_count(), 0);
    assert_eq!(sim.grasp_state(), GraspState::Released);
}

#[test]
fn test_respawn_while_grasped_drops_grasp() {
    let mut sim = session();
    sim.spawn_object(CUBE).unwrap();
    sim.force_grasp().unwrap();

    sim.spawn_object([0.3, 0.3, 0.025]).unwrap();
    assert_eq!(sim.grasp_state(), GraspState::Released);
    assert_eq!(sim.backend().constraint_count(), 0);
    assert_eq!(sim.backend().body_count(), 1);
}

#[test]
fn test_log_is_bounded_and_ordered() {
    let config = SessionConfig::default().with_pose_log_capacity(10);
    let mut sim = SimSession::new(MockBackend::new(), config).unwrap();
    sim.move_joints(&[0.3, -0.2, 0.0, -1.9, 0.0, 1.7, 0.8], 0.5).unwrap();

    let log = sim.pose_log();
    assert_eq!(log.len(), 10);
    let seqs: Vec<u64> = log.iter().map(|e| e.seq).collect();
    assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1));
    assert_eq!(log.latest().unwrap().seq, *seqs.last().unwrap());
    assert!(log.iter().map(|e| e.t).collect::<Vec<_>>().windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_reset_pose_log_then_move() {
    let mut sim = session();
    sim.move_joints(&[0.2, -0.4, 0.0, -2.0, 0.0, 1.7, 0.8], 0.2).unwrap();
    sim.reset_pose_log().unwrap();
    assert_eq!(sim.pose_log().len(), 1);
    assert!(sim.pose_log().latest().unwrap().t < 0.1);

    sim.move_joints(&HOME_CONFIGURATION, 0.2).unwrap();
    assert_eq!(sim.pose_log().len(), 21);
}

#[test]
fn test_cancel_from_another_thread() {
    let mut sim = SimSession::new(MockBackend::new(), SessionConfig::realtime()).unwrap();
    let token = CancelToken::new();
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            token.cancel();
        })
    };

    let logged = sim.pose_log().len();
    let result = sim.move_joints_with_cancel(&[0.5, -0.2, 0.0, -1.5, 0.0, 1.5, 0.5], 2.0, &token);
    canceller.join().unwrap();

    match result {
        Err(Error::Cancelled { completed_steps }) => {
            assert!(completed_steps > 0 && completed_steps < 200);
            assert_eq!(sim.pose_log().len(), logged + completed_steps);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[test]
fn test_reset_returns_home_and_keeps_object() {
    let mut sim = session();
    let cube = sim.spawn_object(CUBE).unwrap();
    sim.close_and_auto_grasp(0.0).unwrap();
    sim.move_joints(&[0.4, -0.1, 0.0, -1.6, 0.0, 1.5, 0.8], 0.3).unwrap();

    sim.reset().unwrap();
    assert_eq!(sim.grasp_state(), GraspState::Released);
    assert_eq!(sim.object(), Some(cube));
    assert_relative_eq!(sim.gripper_width(), 0.08);
    let joints = sim.joint_positions().unwrap();
    for (a, b) in joints.as_slice().iter().zip(HOME_CONFIGURATION) {
        assert_relative_eq!(*a, b, epsilon = 1e-9);
    }
    assert_eq!(sim.pose_log().len(), 1);
}

#[test]
fn test_snapshot_and_log_export() {
    let dir = tempfile::tempdir().unwrap();
    let config =
        SessionConfig::default().with_camera(CameraConfig::default().with_resolution(80, 60));
    let mut sim = SimSession::new(MockBackend::new(), config).unwrap();
    sim.spawn_default_object().unwrap();

    let path = sim.snapshot(dir.path().join("scene.png")).unwrap();
    let img = image::open(&path).unwrap();
    assert_eq!((img.width(), img.height()), (80, 60));

    let export = dir.path().join("log.json");
    sim.pose_log().write_json(&export).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
    assert_eq!(value["log"].as_array().unwrap().len(), sim.pose_log().len());
}

#[test]
fn test_status_round_trips_through_json() {
    let mut sim = session();
    sim.spawn_default_object().unwrap();
    sim.force_grasp().unwrap();
    let status = sim.status().unwrap();
    assert_eq!(status.grasp, GraspState::Grasped);
    assert_eq!(status.backend, "mock");

    let json = serde_json::to_string(&status).unwrap();
    let back: SessionStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(back.grasp, status.grasp);
    assert_eq!(back.object, status.object);
    assert_eq!(back.log_len, status.log_len);
    assert_relative_eq!(back.gripper_width, status.gripper_width, epsilon = 1e-12);
    assert!(back.joints.max_abs_diff(&status.joints) < 1e-12);
}

#[test]
fn test_partial_json_config() {
    let config = SessionConfig::from_json_str(
        r#"{"pose_log": {"capacity": 32}, "grasp": {"distance_threshold": 0.02}}"#,
    )
    .unwrap();
    assert_eq!(config.pose_log.capacity, 32);
    assert_relative_eq!(config.grasp.distance_threshold, 0.02);
    assert_relative_eq!(config.gripper.max_width, 0.08);

    // A tighter threshold turns the proximity grasp into an assisted one
    let mut sim = SimSession::new(MockBackend::new(), config).unwrap();
    sim.spawn_object(CUBE).unwrap();
    sim.move_cartesian(&ABOVE_CUBE, None, 0.5).unwrap();
    let outcome = sim.close_and_auto_grasp(0.0).unwrap();
    assert_eq!(outcome.method, Some(GraspMethod::Assisted));
}
