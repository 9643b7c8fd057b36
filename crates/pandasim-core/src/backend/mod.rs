//! Physics/render backend abstraction
//!
//! The session never simulates anything itself. Joint state, kinematics,
//! rigid bodies, constraints and rendering all live behind
//! [`PhysicsBackend`], so the same control code drives a real engine
//! binding or the kinematic [`MockBackend`] used in tests.
//!
//! # Example
//!
//! ```
//! use pandasim_core::backend::{MockBackend, PhysicsBackend};
//!
//! let mut backend = MockBackend::new();
//! assert_eq!(backend.joints().len(), 12);
//! backend.step().unwrap();
//! assert_eq!(backend.step_count(), 1);
//! ```

mod mock;

pub use mock::{MockBackend, MockBackendConfig};

use serde::{Deserialize, Serialize};

use crate::math::{Matrix4, Pose, Quaternion};
use crate::Result;

/// Handle to a rigid body owned by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyId(pub i32);

/// Handle to a constraint owned by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintId(pub i32);

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

impl std::fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "constraint#{}", self.0)
    }
}

/// Joint type as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointKind {
    Revolute,
    Prismatic,
    Fixed,
}

/// Introspection record for one robot joint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointInfo {
    /// Joint index (also the index of its child link)
    pub index: usize,
    /// Joint name from the robot description
    pub name: String,
    pub kind: JointKind,
}

impl JointInfo {
    pub fn new(index: usize, name: impl Into<String>, kind: JointKind) -> Self {
        Self {
            index,
            name: name.into(),
            kind,
        }
    }
}

/// Contact and damping properties applied to a spawned body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicsProperties {
    pub lateral_friction: f64,
    pub rolling_friction: f64,
    pub spinning_friction: f64,
    pub linear_damping: f64,
    pub angular_damping: f64,
}

impl Default for DynamicsProperties {
    fn default() -> Self {
        Self {
            lateral_friction: 1.2,
            rolling_friction: 0.002,
            spinning_friction: 0.002,
            linear_damping: 0.02,
            angular_damping: 0.02,
        }
    }
}

/// Description of a free rigid body to spawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodySpec {
    /// Cube half edge length in meters
    pub half_extent: f64,
    /// Initial pose of the body's base frame
    pub pose: Pose,
    pub dynamics: DynamicsProperties,
}

/// Fixed (weld) constraint between a robot link and a free body
///
/// Holds `link_pose * parent_offset == body_pose * child_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedConstraint {
    pub parent_link: usize,
    pub child: BodyId,
    pub parent_offset: [f64; 3],
    pub child_offset: [f64; 3],
}

/// Camera matrices and output resolution for an offscreen render
#[derive(Debug, Clone, PartialEq)]
pub struct CameraView {
    /// World-to-camera transform
    pub view: Matrix4,
    /// Camera-to-clip projection
    pub projection: Matrix4,
    pub width: u32,
    pub height: u32,
}

/// Raw RGBA8 frame returned by a render call
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA bytes, `width * height * 4` long
    pub pixels: Vec<u8>,
}

impl RgbaFrame {
    /// Expected byte length for the stated resolution
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Trait for physics/render backends
///
/// Implementations are not expected to be reentrant. The session is the
/// single owner that mutates a backend; everything else reads through it.
pub trait PhysicsBackend: Send {
    /// Get the backend name
    fn name(&self) -> &str;

    /// All joints of the robot, ordered by index
    fn joints(&self) -> Vec<JointInfo>;

    /// Current position of a single joint
    fn joint_position(&self, joint: usize) -> Result<f64>;

    /// Current positions of several joints
    fn joint_positions(&self, joints: &[usize]) -> Result<Vec<f64>> {
        joints.iter().map(|&j| self.joint_position(j)).collect()
    }

    /// Teleport a joint to a position, bypassing the motors
    fn reset_joint_state(&mut self, joint: usize, position: f64) -> Result<()>;

    /// Issue position-control targets with a per-joint force limit
    ///
    /// Takes effect on the next [`step`](Self::step).
    fn set_position_targets(&mut self, joints: &[usize], targets: &[f64], max_force: f64) -> Result<()>;

    /// Advance the simulation by one tick
    fn step(&mut self) -> Result<()>;

    /// World pose of a link frame (forward kinematics)
    fn link_pose(&self, link: usize) -> Result<Pose>;

    /// Solve inverse kinematics for a link
    ///
    /// Returns one value per joint index, i.e. a vector as long as
    /// [`joints`](Self::joints). Convergence is not guaranteed; callers get
    /// whatever the solver ends on.
    fn inverse_kinematics(
        &mut self,
        link: usize,
        position: [f64; 3],
        orientation: Quaternion,
    ) -> Result<Vec<f64>>;

    /// Spawn a free rigid body
    fn spawn_body(&mut self, spec: &BodySpec) -> Result<BodyId>;

    /// Remove a body and every constraint attached to it
    fn remove_body(&mut self, body: BodyId) -> Result<()>;

    /// World pose of a body's base frame
    fn body_pose(&self, body: BodyId) -> Result<Pose>;

    /// Teleport a body
    fn reset_body_pose(&mut self, body: BodyId, pose: Pose) -> Result<()>;

    fn create_fixed_constraint(&mut self, constraint: &FixedConstraint) -> Result<ConstraintId>;

    fn remove_constraint(&mut self, constraint: ConstraintId) -> Result<()>;

    /// Render the scene offscreen
    fn render(&mut self, camera: &CameraView) -> Result<RgbaFrame>;
}

impl<B: PhysicsBackend + ?Sized> PhysicsBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn joints(&self) -> Vec<JointInfo> {
        (**self).joints()
    }

    fn joint_position(&self, joint: usize) -> Result<f64> {
        (**self).joint_position(joint)
    }

    fn joint_positions(&self, joints: &[usize]) -> Result<Vec<f64>> {
        (**self).joint_positions(joints)
    }

    fn reset_joint_state(&mut self, joint: usize, position: f64) -> Result<()> {
        (**self).reset_joint_state(joint, position)
    }

    fn set_position_targets(&mut self, joints: &[usize], targets: &[f64], max_force: f64) -> Result<()> {
        (**self).set_position_targets(joints, targets, max_force)
    }

    fn step(&mut self) -> Result<()> {
        (**self).step()
    }

    fn link_pose(&self, link: usize) -> Result<Pose> {
        (**self).link_pose(link)
    }

    fn inverse_kinematics(
        &mut self,
        link: usize,
        position: [f64; 3],
        orientation: Quaternion,
    ) -> Result<Vec<f64>> {
        (**self).inverse_kinematics(link, position, orientation)
    }

    fn spawn_body(&mut self, spec: &BodySpec) -> Result<BodyId> {
        (**self).spawn_body(spec)
    }

    fn remove_body(&mut self, body: BodyId) -> Result<()> {
        (**self).remove_body(body)
    }

    fn body_pose(&self, body: BodyId) -> Result<Pose> {
        (**self).body_pose(body)
    }

    fn reset_body_pose(&mut self, body: BodyId, pose: Pose) -> Result<()> {
        (**self).reset_body_pose(body, pose)
    }

    fn create_fixed_constraint(&mut self, constraint: &FixedConstraint) -> Result<ConstraintId> {
        (**self).create_fixed_constraint(constraint)
    }

    fn remove_constraint(&mut self, constraint: ConstraintId) -> Result<()> {
        (**self).remove_constraint(constraint)
    }

    fn render(&mut self, camera: &CameraView) -> Result<RgbaFrame> {
        (**self).render(camera)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dynamics() {
        let d = DynamicsProperties::default();
        assert_eq!(d.lateral_friction, 1.2);
        assert_eq!(d.angular_damping, 0.02);
    }

    #[test]
    fn test_frame_expected_len() {
        let frame = RgbaFrame {
            width: 4,
            height: 3,
            pixels: Vec::new(),
        };
        assert_eq!(frame.expected_len(), 48);
    }

    #[test]
    fn test_boxed_backend_is_backend() {
        let mut backend: Box<dyn PhysicsBackend> = Box::new(MockBackend::new());
        assert_eq!(backend.name(), "mock");
        backend.step().unwrap();
    }
}
