//! Simulation session: the robot state model
//!
//! [`SimSession`] is the single owner of the physics backend. It tracks
//! which joints form the arm, the optional object and grasp handles, the
//! gripper aperture and the pose history. Motion and grasp operations are
//! implemented in [`crate::control`] as further `impl` blocks on this type.
//!
//! # Example
//!
//! ```
//! use pandasim_core::backend::MockBackend;
//! use pandasim_core::{SessionConfig, SimSession};
//!
//! let mut sim = SimSession::new(MockBackend::new(), SessionConfig::default())?;
//! sim.spawn_object([0.55, 0.0, 0.025])?;
//! sim.move_joints(&[0.0, -0.3, 0.0, -1.8, 0.0, 1.6, 0.7], 0.5)?;
//! let outcome = sim.close_and_auto_grasp(0.0)?;
//! assert!(outcome.grasped);
//! # Ok::<(), pandasim_core::Error>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::backend::{BodyId, BodySpec, CameraView, ConstraintId, PhysicsBackend};
use crate::capture;
use crate::config::SessionConfig;
use crate::control::GraspState;
use crate::math::{finite_vec3, Pose};
use crate::pose_log::{PoseLog, PoseLogEntry};
use crate::robot::{JointConfiguration, RobotModel};
use crate::{Error, Result};

/// Current end-effector and object poses, stamped on the log clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub t: f64,
    pub ee: Pose,
    pub object: Option<Pose>,
}

/// Summary of the session for inspection after a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub backend: String,
    pub joints: JointConfiguration,
    pub gripper_width: f64,
    pub grasp: GraspState,
    pub object: Option<BodyId>,
    pub log_len: usize,
}

/// A simulation-control session around one physics backend
pub struct SimSession<B: PhysicsBackend> {
    pub(crate) backend: B,
    pub(crate) config: SessionConfig,
    pub(crate) model: RobotModel,
    pub(crate) pose_log: PoseLog,
    pub(crate) camera: CameraView,
    pub(crate) object: Option<BodyId>,
    pub(crate) grasp: Option<ConstraintId>,
    pub(crate) gripper_width: f64,
}

impl<B: PhysicsBackend> SimSession<B> {
    /// Introspect the backend, validate the config and reset to home
    pub fn new(backend: B, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let model = RobotModel::from_joints(&backend.joints(), config.end_effector_link)?;
        if config.home.len() != model.arm_dof() {
            return Err(Error::Config(format!(
                "home configuration has {} values but the arm has {} joints",
                config.home.len(),
                model.arm_dof()
            )));
        }

        let camera = capture::camera_view(&config.camera);
        let pose_log = PoseLog::new(config.pose_log.capacity);
        let gripper_width = config.gripper.max_width;

        let mut session = Self {
            backend,
            config,
            model,
            pose_log,
            camera,
            object: None,
            grasp: None,
            gripper_width,
        };
        session.reset()?;

        tracing::info!(
            backend = session.backend.name(),
            arm_dof = session.model.arm_dof(),
            fingers = session.model.finger_joints().len(),
            "simulation session ready"
        );
        Ok(session)
    }

    /// Return the arm to home with the gripper open and restart the pose log
    ///
    /// Drops any grasp; a spawned object stays where it is.
    pub fn reset(&mut self) -> Result<()> {
        self.drop_constraint();
        for (&joint, &value) in self.model.arm_joints().iter().zip(&self.config.home) {
            self.backend.reset_joint_state(joint, value)?;
        }
        self.set_gripper_width(self.config.gripper.max_width)?;
        self.backend.step()?;
        self.reset_pose_log()?;
        tracing::info!("session reset to home configuration");
        Ok(())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Direct backend access; changes made here are not logged
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn model(&self) -> &RobotModel {
        &self.model
    }

    pub fn arm_dof(&self) -> usize {
        self.model.arm_dof()
    }

    pub fn pose_log(&self) -> &PoseLog {
        &self.pose_log
    }

    pub fn object(&self) -> Option<BodyId> {
        self.object
    }

    /// Last commanded (clamped) gripper aperture
    pub fn gripper_width(&self) -> f64 {
        self.gripper_width
    }

    /// The spawned object, or [`Error::NoObjectPresent`]
    pub fn require_object(&self) -> Result<BodyId> {
        self.object.ok_or(Error::NoObjectPresent)
    }

    /// Current arm joint positions
    pub fn joint_positions(&self) -> Result<JointConfiguration> {
        self.backend
            .joint_positions(self.model.arm_joints())
            .map(JointConfiguration::new)
    }

    pub fn end_effector_pose(&self) -> Result<Pose> {
        self.backend.link_pose(self.model.end_effector_link())
    }

    /// Object pose, `None` when nothing is spawned
    pub fn object_pose(&self) -> Result<Option<Pose>> {
        self.object.map(|id| self.backend.body_pose(id)).transpose()
    }

    /// Current poses on the log clock
    pub fn poses(&self) -> Result<PoseSample> {
        Ok(PoseSample {
            t: self.pose_log.elapsed(),
            ee: self.end_effector_pose()?,
            object: self.object_pose()?,
        })
    }

    /// Append the current poses to the history
    pub fn log_pose(&mut self) -> Result<&PoseLogEntry> {
        let ee = self.end_effector_pose()?;
        let object = self.object_pose()?;
        Ok(self.pose_log.record(ee, object))
    }

    /// Clear the history, restart its clock and log the current state once
    pub fn reset_pose_log(&mut self) -> Result<()> {
        self.pose_log.restart();
        self.log_pose()?;
        Ok(())
    }

    /// Advance one tick and log it
    pub(crate) fn advance(&mut self) -> Result<()> {
        self.backend.step()?;
        self.log_pose()?;
        Ok(())
    }

    /// Spawn the cube, replacing any existing one
    pub fn spawn_object(&mut self, position: [f64; 3]) -> Result<BodyId> {
        let position = finite_vec3(&position)
            .ok_or_else(|| Error::InvalidArgument("pos must be [x,y,z] with finite values".into()))?;

        if let Some(previous) = self.object.take() {
            self.drop_constraint();
            if let Err(e) = self.backend.remove_body(previous) {
                tracing::warn!(body = %previous, error = %e, "failed to remove previous object");
            }
        }

        let spec = BodySpec {
            half_extent: self.config.object.half_extent,
            pose: Pose::from_position(position),
            dynamics: self.config.object.dynamics,
        };
        let id = self.backend.spawn_body(&spec)?;
        self.object = Some(id);
        self.log_pose()?;
        tracing::info!(body = %id, ?position, "spawned object");
        Ok(id)
    }

    /// Spawn the cube at the configured default position
    pub fn spawn_default_object(&mut self) -> Result<BodyId> {
        self.spawn_object(self.config.object.default_position)
    }

    /// Render from the fixed camera and write an RGB image to `path`
    pub fn snapshot(&mut self, path: impl AsRef<Path>) -> Result<PathBuf> {
        capture::capture(&mut self.backend, &self.camera, path)
    }

    pub fn status(&self) -> Result<SessionStatus> {
        Ok(SessionStatus {
            backend: self.backend.name().to_string(),
            joints: self.joint_positions()?,
            gripper_width: self.gripper_width,
            grasp: self.grasp_state(),
            object: self.object,
            log_len: self.pose_log.len(),
        })
    }

    /// Remove the grasp constraint if one exists; backend failures are logged and swallowed
    pub(crate) fn drop_constraint(&mut self) -> bool {
        match self.grasp.take() {
            Some(id) => {
                if let Err(e) = self.backend.remove_constraint(id) {
                    tracing::warn!(constraint = %id, error = %e, "failed to remove grasp constraint");
                }
                true
            }
            None => false,
        }
    }
}

impl<B: PhysicsBackend> std::fmt::Debug for SimSession<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimSession")
            .field("backend", &self.backend.name())
            .field("arm_dof", &self.model.arm_dof())
            .field("object", &self.object)
            .field("grasp", &self.grasp)
            .field("gripper_width", &self.gripper_width)
            .field("log_len", &self.pose_log.len())
            .finish()
    }
}

/// A session shared between threads
///
/// Every operation holds the lock for its whole duration, so concurrent
/// callers are serialized one call at a time.
pub struct SharedSession<B: PhysicsBackend> {
    inner: Arc<Mutex<SimSession<B>>>,
}

impl<B: PhysicsBackend> SharedSession<B> {
    pub fn new(session: SimSession<B>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Lock the session for a sequence of calls
    pub fn lock(&self) -> MutexGuard<'_, SimSession<B>> {
        self.inner.lock()
    }

    /// Run one closure with exclusive access
    pub fn with<R>(&self, f: impl FnOnce(&mut SimSession<B>) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}

impl<B: PhysicsBackend> Clone for SharedSession<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::robot::HOME_CONFIGURATION;
    use approx::assert_relative_eq;

    fn session() -> SimSession<MockBackend> {
        SimSession::new(MockBackend::new(), SessionConfig::default()).unwrap()
    }

    #[test]
    fn test_starts_at_home_with_one_log_entry() {
        let sim = session();
        let joints = sim.joint_positions().unwrap();
        for (a, b) in joints.as_slice().iter().zip(HOME_CONFIGURATION) {
            assert_relative_eq!(*a, b, epsilon = 1e-12);
        }
        assert_eq!(sim.pose_log().len(), 1);
        assert_relative_eq!(sim.gripper_width(), 0.08);
        assert!(sim.object().is_none());
        assert_eq!(sim.grasp_state(), GraspState::Released);
    }

    #[test]
    fn test_rejects_mismatched_home() {
        let config = SessionConfig::default().with_home(vec![0.0; 6]);
        assert!(matches!(
            SimSession::new(MockBackend::new(), config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_spawn_replaces_previous_object() {
        let mut sim = session();
        let first = sim.spawn_object([0.5, 0.0, 0.025]).unwrap();
        let second = sim.spawn_object([0.6, 0.1, 0.025]).unwrap();
        assert_ne!(first, second);
        assert_eq!(sim.backend().body_count(), 1);
        assert_eq!(sim.object(), Some(second));
        let pose = sim.object_pose().unwrap().unwrap();
        assert_relative_eq!(pose.position[0], 0.6);
    }

    #[test]
    fn test_spawn_logs_object_pose() {
        let mut sim = session();
        let before = sim.pose_log().len();
        sim.spawn_default_object().unwrap();
        assert_eq!(sim.pose_log().len(), before + 1);
        let latest = sim.pose_log().latest().unwrap();
        assert_relative_eq!(latest.object.unwrap().position[0], 0.5);
    }

    #[test]
    fn test_spawn_rejects_non_finite_position() {
        let mut sim = session();
        let calls = sim.backend().call_count();
        assert!(matches!(
            sim.spawn_object([0.5, f64::INFINITY, 0.0]),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(sim.backend().call_count(), calls);
    }

    #[test]
    fn test_reset_pose_log_leaves_single_entry() {
        let mut sim = session();
        for _ in 0..10 {
            sim.log_pose().unwrap();
        }
        sim.reset_pose_log().unwrap();
        assert_eq!(sim.pose_log().len(), 1);
        assert!(sim.pose_log().latest().unwrap().t < 0.1);
    }

    #[test]
    fn test_poses_sample() {
        let mut sim = session();
        let sample = sim.poses().unwrap();
        assert!(sample.object.is_none());
        sim.spawn_default_object().unwrap();
        assert!(sim.poses().unwrap().object.is_some());
    }

    #[test]
    fn test_shared_session_serializes_calls() {
        let shared = SharedSession::new(session());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    shared.with(|sim| sim.log_pose().map(|_| ()))
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }
        assert_eq!(shared.lock().pose_log().len(), 5);
    }
}
