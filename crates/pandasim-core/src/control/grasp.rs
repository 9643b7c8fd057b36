//! Grasp controller: gripper aperture and the grasp/release state machine
//!
//! Grasping is a fixed weld from the end-effector link to the object, not a
//! contact-force simulation. Width and grasp state are independent: closing
//! the fingers never creates a weld by itself, and welding never moves the
//! fingers.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{ConstraintId, FixedConstraint, PhysicsBackend};
use crate::session::SimSession;
use crate::{Error, Result};

/// Whether a grasp constraint is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraspState {
    Released,
    Grasped,
}

/// How a grasp was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraspMethod {
    /// The end-effector was already close enough to the object
    Proximity,
    /// The object was snapped onto the end-effector before welding
    Assisted,
}

/// Result of [`SimSession::close_and_auto_grasp`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraspOutcome {
    /// Commanded width after clamping
    pub width: f64,
    /// Whether a grasp constraint is active after the call
    pub grasped: bool,
    /// How the grasp was made, `None` when this call did not attach
    pub method: Option<GraspMethod>,
}

impl<B: PhysicsBackend> SimSession<B> {
    pub fn grasp_state(&self) -> GraspState {
        if self.grasp.is_some() {
            GraspState::Grasped
        } else {
            GraspState::Released
        }
    }

    /// Command the finger aperture and let it settle
    ///
    /// The width is clamped to `[0, max_width]` and split evenly between the
    /// two fingers. Returns the clamped width.
    pub fn set_gripper_width(&mut self, width: f64) -> Result<f64> {
        if !width.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "width must be a finite number, got {width}"
            )));
        }
        let gripper = &self.config.gripper;
        let width = width.clamp(0.0, gripper.max_width);
        let (force, settle_steps) = (gripper.finger_force, gripper.settle_steps);
        let pause = (self.config.motion.realtime && gripper.settle_pause > 0.0)
            .then(|| Duration::from_secs_f64(gripper.settle_pause));

        if self.model.finger_joints().is_empty() {
            tracing::warn!(width, "model has no finger joints, gripper command ignored");
            self.log_pose()?;
            return Ok(width);
        }

        let fingers = self.model.finger_joints().to_vec();
        let targets = vec![width / 2.0; fingers.len()];
        self.backend.set_position_targets(&fingers, &targets, force)?;
        self.gripper_width = width;

        for _ in 0..settle_steps {
            self.advance()?;
            if let Some(pause) = pause {
                thread::sleep(pause);
            }
        }
        tracing::debug!(width, settle_steps, "gripper settled");
        Ok(width)
    }

    /// Close to `width` and attach the object if the gripper is closed enough
    ///
    /// When the end-effector is within the distance threshold the object is
    /// welded where it is. Otherwise, if an object exists, it is snapped
    /// onto the end-effector first; the outcome reports that as
    /// [`GraspMethod::Assisted`].
    pub fn close_and_auto_grasp(&mut self, width: f64) -> Result<GraspOutcome> {
        let width = self.set_gripper_width(width)?;
        let grasp = self.config.grasp.clone();

        if width > grasp.close_threshold {
            return Ok(GraspOutcome {
                width,
                grasped: self.grasp.is_some(),
                method: None,
            });
        }

        if self.try_auto_grasp(grasp.distance_threshold)? {
            return Ok(GraspOutcome {
                width,
                grasped: true,
                method: Some(GraspMethod::Proximity),
            });
        }

        if self.object.is_some()
            && self.align_object_to_end_effector(grasp.align_offset)?
            && self.force_grasp()?
        {
            tracing::warn!("proximity grasp failed, object snapped to end-effector");
            return Ok(GraspOutcome {
                width,
                grasped: true,
                method: Some(GraspMethod::Assisted),
            });
        }

        Ok(GraspOutcome {
            width,
            grasped: self.grasp.is_some(),
            method: None,
        })
    }

    /// Weld the object if the end-effector is strictly closer than `threshold`
    pub fn try_auto_grasp(&mut self, threshold: f64) -> Result<bool> {
        let Some(object) = self.object else {
            return Ok(false);
        };
        let ee = self.end_effector_pose()?;
        let body = self.backend.body_pose(object)?;
        let distance = ee.translation_distance(&body);
        tracing::debug!(distance, threshold, "auto grasp check");

        if distance < threshold {
            self.force_grasp()
        } else {
            Ok(false)
        }
    }

    /// Weld the object to the end-effector regardless of distance
    ///
    /// Replaces any existing grasp, so at most one constraint is ever active.
    /// Returns `false` when there is no object.
    pub fn force_grasp(&mut self) -> Result<bool> {
        let Some(object) = self.object else {
            return Ok(false);
        };
        self.drop_constraint();

        let constraint = FixedConstraint {
            parent_link: self.model.end_effector_link(),
            child: object,
            parent_offset: self.config.grasp.constraint_offset,
            child_offset: [0.0; 3],
        };
        let id = self.backend.create_fixed_constraint(&constraint)?;
        self.grasp = Some(id);
        self.advance()?;
        tracing::info!(constraint = %id, body = %object, "object grasped");
        Ok(true)
    }

    /// [`force_grasp`](Self::force_grasp) that treats a missing object as an error
    pub fn attach_object(&mut self) -> Result<ConstraintId> {
        self.require_object()?;
        self.force_grasp()?;
        self.grasp
            .ok_or_else(|| Error::Backend("grasp constraint missing after attach".into()))
    }

    /// Teleport the object to the end-effector position plus `offset`
    ///
    /// The object takes the end-effector orientation. Returns `false` when
    /// there is no object.
    pub fn align_object_to_end_effector(&mut self, offset: [f64; 3]) -> Result<bool> {
        let Some(object) = self.object else {
            return Ok(false);
        };
        if offset.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidArgument(format!(
                "offset must be finite, got {offset:?}"
            )));
        }
        let ee = self.end_effector_pose()?;
        let target = ee.translated(offset);
        self.backend.reset_body_pose(object, target)?;
        self.advance()?;
        tracing::debug!(body = %object, position = ?target.position, "object aligned to end-effector");
        Ok(true)
    }

    /// Drop any grasp and open to the release width
    ///
    /// Safe to call repeatedly.
    pub fn release(&mut self) -> Result<()> {
        if self.drop_constraint() {
            tracing::info!("object released");
        }
        self.log_pose()?;
        self.set_gripper_width(self.config.gripper.release_width)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::config::SessionConfig;
    use crate::math::add3;
    use approx::assert_relative_eq;

    fn session() -> SimSession<MockBackend> {
        SimSession::new(MockBackend::new(), SessionConfig::default()).unwrap()
    }

    #[test]
    fn test_width_is_clamped() {
        let mut sim = session();
        assert_relative_eq!(sim.set_gripper_width(0.5).unwrap(), 0.08);
        assert_relative_eq!(sim.set_gripper_width(-1.0).unwrap(), 0.0);
        assert_relative_eq!(sim.set_gripper_width(0.03).unwrap(), 0.03);
        assert_relative_eq!(sim.gripper_width(), 0.03);
        assert_relative_eq!(sim.backend().joint_position(9).unwrap(), 0.015, epsilon = 1e-12);
        assert_relative_eq!(sim.backend().joint_position(10).unwrap(), 0.015, epsilon = 1e-12);
    }

    #[test]
    fn test_width_rejects_nan() {
        let mut sim = session();
        let calls = sim.backend().call_count();
        assert!(matches!(
            sim.set_gripper_width(f64::NAN),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(sim.backend().call_count(), calls);
    }

    #[test]
    fn test_settle_steps_are_logged() {
        let mut sim = session();
        let logged = sim.pose_log().len();
        sim.set_gripper_width(0.04).unwrap();
        assert_eq!(sim.pose_log().len(), logged + 30);
        assert_eq!(sim.backend().commanded_force(9), Some(20.0));
    }

    #[test]
    fn test_closing_never_welds() {
        let mut sim = session();
        sim.spawn_object([0.45, 0.0, 0.5]).unwrap();
        sim.set_gripper_width(0.0).unwrap();
        assert_eq!(sim.grasp_state(), GraspState::Released);
        assert_eq!(sim.backend().constraint_count(), 0);
    }

    #[test]
    fn test_grasp_ops_without_object() {
        let mut sim = session();
        assert!(!sim.force_grasp().unwrap());
        assert!(!sim.try_auto_grasp(1.0).unwrap());
        assert!(!sim.align_object_to_end_effector([0.0; 3]).unwrap());
        let outcome = sim.close_and_auto_grasp(0.0).unwrap();
        assert!(!outcome.grasped);
        assert_eq!(outcome.method, None);
        assert_eq!(sim.grasp_state(), GraspState::Released);
    }

    #[test]
    fn test_attach_without_object_is_an_error() {
        let mut sim = session();
        let calls = sim.backend().call_count();
        assert!(matches!(sim.attach_object(), Err(Error::NoObjectPresent)));
        assert!(matches!(sim.require_object(), Err(Error::NoObjectPresent)));
        assert_eq!(sim.backend().call_count(), calls);

        let cube = sim.spawn_default_object().unwrap();
        assert_eq!(sim.require_object().unwrap(), cube);
        sim.attach_object().unwrap();
        assert_eq!(sim.grasp_state(), GraspState::Grasped);
        assert_eq!(sim.backend().constraint_count(), 1);
    }

    #[test]
    fn test_force_grasp_keeps_single_constraint() {
        let mut sim = session();
        sim.spawn_default_object().unwrap();
        assert!(sim.force_grasp().unwrap());
        assert!(sim.force_grasp().unwrap());
        assert_eq!(sim.backend().constraint_count(), 1);
        assert_eq!(sim.grasp_state(), GraspState::Grasped);
    }

    #[test]
    fn test_auto_grasp_threshold_is_strict() {
        let mut sim = session();
        let ee = sim.end_effector_pose().unwrap();
        sim.spawn_object(add3(ee.position, [0.0, 0.0, -0.05])).unwrap();
        assert!(!sim.try_auto_grasp(0.04).unwrap());
        assert!(sim.try_auto_grasp(0.06).unwrap());
        assert_eq!(sim.grasp_state(), GraspState::Grasped);
    }

    #[test]
    fn test_wide_close_does_not_grasp() {
        let mut sim = session();
        let ee = sim.end_effector_pose().unwrap();
        sim.spawn_object(ee.position).unwrap();
        let outcome = sim.close_and_auto_grasp(0.02).unwrap();
        assert!(!outcome.grasped);
        assert_eq!(outcome.method, None);
        assert_relative_eq!(outcome.width, 0.02);
    }

    #[test]
    fn test_align_snaps_object_below_end_effector() {
        let mut sim = session();
        sim.spawn_default_object().unwrap();
        assert!(sim.align_object_to_end_effector([0.0, 0.0, -0.06]).unwrap());
        let ee = sim.end_effector_pose().unwrap();
        let object = sim.object_pose().unwrap().unwrap();
        assert_relative_eq!(object.position[2], ee.position[2] - 0.06, epsilon = 1e-12);
        assert!(object.angular_distance(&ee) < 1e-6);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut sim = session();
        sim.spawn_default_object().unwrap();
        sim.force_grasp().unwrap();
        sim.release().unwrap();
        sim.release().unwrap();
        assert_eq!(sim.grasp_state(), GraspState::Released);
        assert_eq!(sim.backend().constraint_count(), 0);
        assert_relative_eq!(sim.gripper_width(), 0.05);
    }

    #[test]
    fn test_grasp_state_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&GraspState::Grasped).unwrap(), "\"grasped\"");
        assert_eq!(
            serde_json::to_string(&Some(GraspMethod::Assisted)).unwrap(),
            "\"assisted\""
        );
    }
}
