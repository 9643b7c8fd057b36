//! Mock physics backend for testing
//!
//! A purely kinematic stand-in for a real engine: a Panda-like 7-DoF chain
//! described by modified DH parameters, ideal position servos, free bodies
//! that stay wherever they are put, welds that drag their child body along
//! with the parent link, and a flat-shaded marker renderer.

use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use nalgebra::{Matrix6, SMatrix, Vector4, Vector6};
use serde::{Deserialize, Serialize};

use crate::math::{Pose, Quaternion};
use crate::{Error, Result};

use super::{
    BodyId, BodySpec, CameraView, ConstraintId, FixedConstraint, JointInfo, JointKind,
    PhysicsBackend, RgbaFrame,
};

const ARM_JOINTS: usize = 7;
const FLANGE_LINK: usize = 7;
const HAND_LINK: usize = 8;
const LEFT_FINGER_LINK: usize = 9;
const RIGHT_FINGER_LINK: usize = 10;
const GRASP_TARGET_LINK: usize = 11;
const NUM_JOINTS: usize = 12;

/// Modified DH parameters `(a, d, alpha)` for the seven arm joints
const DH: [(f64, f64, f64); ARM_JOINTS] = [
    (0.0, 0.333, 0.0),
    (0.0, 0.0, -FRAC_PI_2),
    (0.0, 0.316, FRAC_PI_2),
    (0.0825, 0.0, FRAC_PI_2),
    (-0.0825, 0.384, -FRAC_PI_2),
    (0.0, 0.0, FRAC_PI_2),
    (0.088, 0.0, FRAC_PI_2),
];
const FLANGE_OFFSET: f64 = 0.107;
const FINGER_OFFSET: f64 = 0.0584;
const GRASP_TARGET_OFFSET: f64 = 0.105;
const FINGER_TRAVEL: f64 = 0.04;

const JOINT_LAYOUT: [(&str, JointKind); NUM_JOINTS] = [
    ("panda_joint1", JointKind::Revolute),
    ("panda_joint2", JointKind::Revolute),
    ("panda_joint3", JointKind::Revolute),
    ("panda_joint4", JointKind::Revolute),
    ("panda_joint5", JointKind::Revolute),
    ("panda_joint6", JointKind::Revolute),
    ("panda_joint7", JointKind::Revolute),
    ("panda_joint8", JointKind::Fixed),
    ("panda_hand_joint", JointKind::Fixed),
    ("panda_finger_joint1", JointKind::Prismatic),
    ("panda_finger_joint2", JointKind::Prismatic),
    ("panda_grasptarget_hand", JointKind::Fixed),
];

/// Finite-difference step for the numeric Jacobian
const JACOBIAN_EPS: f64 = 1e-6;

/// Tunables for [`MockBackend`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockBackendConfig {
    /// Simulated seconds per tick
    pub timestep: f64,
    /// Fraction of the remaining position error a servo closes per tick (1.0 = ideal)
    pub tracking_gain: f64,
    /// Maximum damped least-squares iterations
    pub ik_iterations: usize,
    /// Damping factor for the IK solve
    pub ik_damping: f64,
    /// Stop iterating once the 6D pose error norm drops below this
    pub ik_tolerance: f64,
}

impl Default for MockBackendConfig {
    fn default() -> Self {
        Self {
            timestep: 1.0 / 240.0,
            tracking_gain: 1.0,
            ik_iterations: 100,
            ik_damping: 0.05,
            ik_tolerance: 1e-6,
        }
    }
}

impl MockBackendConfig {
    /// Servos that only close part of the gap each tick
    pub fn with_tracking_gain(mut self, gain: f64) -> Self {
        self.tracking_gain = gain;
        self
    }
}

#[derive(Debug, Clone)]
struct MockJoint {
    info: JointInfo,
    position: f64,
    target: Option<f64>,
    max_force: f64,
}

#[derive(Debug, Clone)]
struct MockBody {
    spec: BodySpec,
    pose: Pose,
}

/// A kinematic mock backend for testing without a physics engine
#[derive(Debug)]
pub struct MockBackend {
    config: MockBackendConfig,
    joints: Vec<MockJoint>,
    bodies: HashMap<BodyId, MockBody>,
    constraints: HashMap<ConstraintId, FixedConstraint>,
    next_handle: i32,
    sim_time: f64,
    step_count: u64,
    call_count: u64,
    fail_render: bool,
    fail_ik: bool,
    ik_override: Option<Vec<f64>>,
    fail_steps_after: Option<u64>,
}

impl MockBackend {
    /// Create a new mock backend with default config
    pub fn new() -> Self {
        Self::with_config(MockBackendConfig::default())
    }

    /// Create with custom config
    pub fn with_config(config: MockBackendConfig) -> Self {
        let joints = JOINT_LAYOUT
            .iter()
            .enumerate()
            .map(|(index, &(name, kind))| MockJoint {
                info: JointInfo::new(index, name, kind),
                position: 0.0,
                target: None,
                max_force: 0.0,
            })
            .collect();
        Self {
            config,
            joints,
            bodies: HashMap::new(),
            constraints: HashMap::new(),
            next_handle: 1,
            sim_time: 0.0,
            step_count: 0,
            call_count: 0,
            fail_render: false,
            fail_ik: false,
            ik_override: None,
            fail_steps_after: None,
        }
    }

    /// Simulated time in seconds
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Number of completed ticks
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Number of state-changing calls received (commands, steps, spawns, ...)
    pub fn call_count(&self) -> u64 {
        self.call_count
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Force limit of the last command sent to a joint
    pub fn commanded_force(&self, joint: usize) -> Option<f64> {
        self.joints.get(joint).map(|j| j.max_force)
    }

    /// Make every subsequent render call fail
    pub fn set_render_failure(&mut self, fail: bool) {
        self.fail_render = fail;
    }

    /// Make every subsequent IK call fail
    pub fn set_ik_failure(&mut self, fail: bool) {
        self.fail_ik = fail;
    }

    /// Return `solution` from every subsequent IK call instead of solving
    pub fn set_ik_solution(&mut self, solution: Option<Vec<f64>>) {
        self.ik_override = solution;
    }

    /// Make `step` fail once the total tick count reaches `ticks`
    pub fn fail_steps_after(&mut self, ticks: Option<u64>) {
        self.fail_steps_after = ticks;
    }

    fn dh_frame(joint: usize, theta: f64) -> Pose {
        let (a, d, alpha) = DH[joint];
        Pose::new([a, 0.0, 0.0], Quaternion::from_axis_angle([1.0, 0.0, 0.0], alpha))
            * Pose::new([0.0, 0.0, d], Quaternion::from_axis_angle([0.0, 0.0, 1.0], theta))
    }

    /// World poses of every link for the given joint positions
    fn forward(positions: &[f64]) -> [Pose; NUM_JOINTS] {
        let mut frames = [Pose::identity(); NUM_JOINTS];
        let mut current = Pose::identity();
        for (joint, frame) in frames.iter_mut().enumerate().take(ARM_JOINTS) {
            current = current * Self::dh_frame(joint, positions[joint]);
            *frame = current;
        }
        let flange = current * Pose::from_position([0.0, 0.0, FLANGE_OFFSET]);
        let hand = flange
            * Pose::from_orientation(Quaternion::from_axis_angle([0.0, 0.0, 1.0], -FRAC_PI_4));
        frames[FLANGE_LINK] = flange;
        frames[HAND_LINK] = hand;
        frames[LEFT_FINGER_LINK] =
            hand * Pose::from_position([0.0, positions[LEFT_FINGER_LINK], FINGER_OFFSET]);
        frames[RIGHT_FINGER_LINK] =
            hand * Pose::from_position([0.0, -positions[RIGHT_FINGER_LINK], FINGER_OFFSET]);
        frames[GRASP_TARGET_LINK] = hand * Pose::from_position([0.0, 0.0, GRASP_TARGET_OFFSET]);
        frames
    }

    fn positions(&self) -> Vec<f64> {
        self.joints.iter().map(|j| j.position).collect()
    }

    fn joint_mut(&mut self, joint: usize) -> Result<&mut MockJoint> {
        self.joints
            .get_mut(joint)
            .ok_or_else(|| Error::Backend(format!("joint index {joint} out of range")))
    }

    fn clamp_joint(joint: &mut MockJoint) {
        if joint.info.kind == JointKind::Prismatic {
            joint.position = joint.position.clamp(0.0, FINGER_TRAVEL);
        }
    }

    /// Snap every welded body onto its parent link
    fn apply_constraints(&mut self) {
        if self.constraints.is_empty() {
            return;
        }
        let frames = Self::forward(&self.positions());
        for constraint in self.constraints.values() {
            let Some(body) = self.bodies.get_mut(&constraint.child) else {
                continue;
            };
            body.pose = frames[constraint.parent_link]
                * Pose::from_position(constraint.parent_offset)
                * Pose::from_position(constraint.child_offset).inverse();
        }
    }

    /// Damped least-squares IK over the arm joints, seeded at the current state
    fn solve_ik(&self, link: usize, position: [f64; 3], orientation: Quaternion) -> Vec<f64> {
        let mut q = self.positions();
        let damping_sq = self.config.ik_damping * self.config.ik_damping;

        for _ in 0..self.config.ik_iterations {
            let current = Self::forward(&q)[link];
            let rot = current.orientation.rotation_error(&orientation);
            let error = Vector6::new(
                position[0] - current.position[0],
                position[1] - current.position[1],
                position[2] - current.position[2],
                rot[0],
                rot[1],
                rot[2],
            );
            if error.norm() < self.config.ik_tolerance {
                break;
            }

            let mut jacobian = SMatrix::<f64, 6, ARM_JOINTS>::zeros();
            for j in 0..ARM_JOINTS {
                let mut probe = q.clone();
                probe[j] += JACOBIAN_EPS;
                let moved = Self::forward(&probe)[link];
                let drot = current.orientation.rotation_error(&moved.orientation);
                for axis in 0..3 {
                    jacobian[(axis, j)] =
                        (moved.position[axis] - current.position[axis]) / JACOBIAN_EPS;
                    jacobian[(axis + 3, j)] = drot[axis] / JACOBIAN_EPS;
                }
            }

            let jjt = jacobian * jacobian.transpose() + Matrix6::identity() * damping_sq;
            let Some(inv) = jjt.try_inverse() else {
                tracing::debug!("mock IK: singular normal matrix, stopping early");
                break;
            };
            let dq = jacobian.transpose() * inv * error;
            for (j, delta) in dq.iter().enumerate() {
                q[j] += delta;
            }
        }
        q
    }

    fn fill_square(frame: &mut RgbaFrame, cx: i64, cy: i64, radius: i64, color: [u8; 3]) {
        let (w, h) = (frame.width as i64, frame.height as i64);
        for y in (cy - radius).max(0)..=(cy + radius).min(h - 1) {
            for x in (cx - radius).max(0)..=(cx + radius).min(w - 1) {
                let offset = ((y * w + x) * 4) as usize;
                frame.pixels[offset..offset + 3].copy_from_slice(&color);
            }
        }
    }
}

/// Marker size in pixels for a body of the given half extent
fn marker_radius(half_extent: f64) -> i64 {
    ((half_extent * 240.0).round() as i64).clamp(2, 24)
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn joints(&self) -> Vec<JointInfo> {
        self.joints.iter().map(|j| j.info.clone()).collect()
    }

    fn joint_position(&self, joint: usize) -> Result<f64> {
        self.joints
            .get(joint)
            .map(|j| j.position)
            .ok_or_else(|| Error::Backend(format!("joint index {joint} out of range")))
    }

    /// Teleports the joint and drops its motor target until the next command.
    fn reset_joint_state(&mut self, joint: usize, position: f64) -> Result<()> {
        self.call_count += 1;
        let joint = self.joint_mut(joint)?;
        joint.position = position;
        joint.target = None;
        Self::clamp_joint(joint);
        self.apply_constraints();
        Ok(())
    }

    fn set_position_targets(&mut self, joints: &[usize], targets: &[f64], max_force: f64) -> Result<()> {
        self.call_count += 1;
        if joints.len() != targets.len() {
            return Err(Error::Backend(format!(
                "{} joints but {} targets",
                joints.len(),
                targets.len()
            )));
        }
        for (&index, &target) in joints.iter().zip(targets) {
            let joint = self.joint_mut(index)?;
            joint.target = Some(target);
            joint.max_force = max_force;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        self.call_count += 1;
        if let Some(limit) = self.fail_steps_after {
            if self.step_count >= limit {
                return Err(Error::Backend(format!("injected step failure at tick {limit}")));
            }
        }

        let gain = self.config.tracking_gain;
        for joint in &mut self.joints {
            if let Some(target) = joint.target {
                joint.position += gain * (target - joint.position);
                Self::clamp_joint(joint);
            }
        }
        self.apply_constraints();

        self.sim_time += self.config.timestep;
        self.step_count += 1;
        tracing::trace!(tick = self.step_count, "mock step");
        Ok(())
    }

    fn link_pose(&self, link: usize) -> Result<Pose> {
        if link >= NUM_JOINTS {
            return Err(Error::Backend(format!("link index {link} out of range")));
        }
        Ok(Self::forward(&self.positions())[link])
    }

    fn inverse_kinematics(
        &mut self,
        link: usize,
        position: [f64; 3],
        orientation: Quaternion,
    ) -> Result<Vec<f64>> {
        if self.fail_ik {
            return Err(Error::Backend("injected IK failure".into()));
        }
        if link >= NUM_JOINTS {
            return Err(Error::Backend(format!("link index {link} out of range")));
        }
        if let Some(solution) = &self.ik_override {
            return Ok(solution.clone());
        }
        Ok(self.solve_ik(link, position, orientation))
    }

    fn spawn_body(&mut self, spec: &BodySpec) -> Result<BodyId> {
        self.call_count += 1;
        let id = BodyId(self.next_handle);
        self.next_handle += 1;
        self.bodies.insert(
            id,
            MockBody {
                spec: spec.clone(),
                pose: spec.pose,
            },
        );
        Ok(id)
    }

    fn remove_body(&mut self, body: BodyId) -> Result<()> {
        self.call_count += 1;
        if self.bodies.remove(&body).is_none() {
            return Err(Error::Backend(format!("unknown {body}")));
        }
        self.constraints.retain(|_, c| c.child != body);
        Ok(())
    }

    fn body_pose(&self, body: BodyId) -> Result<Pose> {
        self.bodies
            .get(&body)
            .map(|b| b.pose)
            .ok_or_else(|| Error::Backend(format!("unknown {body}")))
    }

    fn reset_body_pose(&mut self, body: BodyId, pose: Pose) -> Result<()> {
        self.call_count += 1;
        let entry = self
            .bodies
            .get_mut(&body)
            .ok_or_else(|| Error::Backend(format!("unknown {body}")))?;
        entry.pose = pose;
        Ok(())
    }

    fn create_fixed_constraint(&mut self, constraint: &FixedConstraint) -> Result<ConstraintId> {
        self.call_count += 1;
        if constraint.parent_link >= NUM_JOINTS {
            return Err(Error::Backend(format!(
                "link index {} out of range",
                constraint.parent_link
            )));
        }
        if !self.bodies.contains_key(&constraint.child) {
            return Err(Error::Backend(format!("unknown {}", constraint.child)));
        }
        let id = ConstraintId(self.next_handle);
        self.next_handle += 1;
        self.constraints.insert(id, *constraint);
        Ok(id)
    }

    fn remove_constraint(&mut self, constraint: ConstraintId) -> Result<()> {
        self.call_count += 1;
        self.constraints
            .remove(&constraint)
            .map(|_| ())
            .ok_or_else(|| Error::Backend(format!("unknown {constraint}")))
    }

    fn render(&mut self, camera: &CameraView) -> Result<RgbaFrame> {
        if self.fail_render {
            return Err(Error::Render("injected render failure".into()));
        }
        if camera.width == 0 || camera.height == 0 {
            return Err(Error::Render(format!(
                "invalid resolution {}x{}",
                camera.width, camera.height
            )));
        }

        let mut frame = RgbaFrame {
            width: camera.width,
            height: camera.height,
            pixels: Vec::with_capacity(camera.width as usize * camera.height as usize * 4),
        };
        for row in 0..camera.height {
            let shade = (230 - (row * 90 / camera.height)) as u8;
            for _ in 0..camera.width {
                frame.pixels.extend_from_slice(&[shade, shade, 235, 255]);
            }
        }

        let view_proj = camera.projection * camera.view;
        let frames = Self::forward(&self.positions());
        let links = frames.iter().map(|p| (p.position, [255u8, 140, 0], 3i64));
        let bodies = self
            .bodies
            .values()
            .map(|b| (b.pose.position, [200u8, 30, 30], marker_radius(b.spec.half_extent)));

        for (p, color, radius) in links.chain(bodies) {
            let clip = view_proj * Vector4::new(p[0], p[1], p[2], 1.0);
            if clip.w <= 0.0 {
                continue;
            }
            let (nx, ny) = (clip.x / clip.w, clip.y / clip.w);
            if nx.abs() > 1.0 || ny.abs() > 1.0 {
                continue;
            }
            let cx = ((nx + 1.0) * 0.5 * f64::from(camera.width)) as i64;
            let cy = ((1.0 - ny) * 0.5 * f64::from(camera.height)) as i64;
            Self::fill_square(&mut frame, cx, cy, radius, color);
        }
        Ok(frame)
    }
}
