//! Robot description derived from backend joint introspection

use serde::{Deserialize, Serialize};

use crate::backend::{JointInfo, JointKind};
use crate::{Error, Result};

/// Ordered arm joint angles (radians), one per arm joint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointConfiguration(Vec<f64>);

impl JointConfiguration {
    pub fn new(positions: Vec<f64>) -> Self {
        Self(positions)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Get a joint position by index
    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    /// Largest absolute per-joint difference to another configuration
    pub fn max_abs_diff(&self, other: &JointConfiguration) -> f64 {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}

impl From<Vec<f64>> for JointConfiguration {
    fn from(v: Vec<f64>) -> Self {
        Self(v)
    }
}

impl From<&[f64]> for JointConfiguration {
    fn from(v: &[f64]) -> Self {
        Self(v.to_vec())
    }
}

impl AsRef<[f64]> for JointConfiguration {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

/// Which backend joints make up the arm and the gripper
///
/// Arm joints are the revolute ones; finger joints are those whose name
/// contains `"finger"`. Both lists keep backend index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotModel {
    arm_joints: Vec<usize>,
    finger_joints: Vec<usize>,
    end_effector_link: usize,
    num_joints: usize,
}

impl RobotModel {
    /// Classify joints reported by the backend
    pub fn from_joints(joints: &[JointInfo], end_effector_link: usize) -> Result<Self> {
        let arm_joints: Vec<usize> = joints
            .iter()
            .filter(|j| j.kind == JointKind::Revolute)
            .map(|j| j.index)
            .collect();
        let finger_joints: Vec<usize> = joints
            .iter()
            .filter(|j| j.name.contains("finger"))
            .map(|j| j.index)
            .collect();

        if arm_joints.is_empty() {
            return Err(Error::Config("backend reports no revolute arm joints".into()));
        }
        if end_effector_link >= joints.len() {
            return Err(Error::Config(format!(
                "end-effector link {} out of range for {} joints",
                end_effector_link,
                joints.len()
            )));
        }

        tracing::debug!(
            arm = ?arm_joints,
            fingers = ?finger_joints,
            ee = end_effector_link,
            "classified robot joints"
        );

        Ok(Self {
            arm_joints,
            finger_joints,
            end_effector_link,
            num_joints: joints.len(),
        })
    }

    /// Arm degrees of freedom
    pub fn arm_dof(&self) -> usize {
        self.arm_joints.len()
    }

    pub fn arm_joints(&self) -> &[usize] {
        &self.arm_joints
    }

    pub fn finger_joints(&self) -> &[usize] {
        &self.finger_joints
    }

    pub fn end_effector_link(&self) -> usize {
        self.end_effector_link
    }

    /// Total joint count reported by the backend
    pub fn num_joints(&self) -> usize {
        self.num_joints
    }

    /// Check that a target has one finite value per arm joint
    pub fn validate(&self, target: &[f64]) -> Result<()> {
        if target.len() != self.arm_dof() {
            return Err(Error::InvalidArgument(format!(
                "targets must be list of length {}, got {}",
                self.arm_dof(),
                target.len()
            )));
        }
        if let Some(i) = target.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidArgument(format!(
                "target for arm joint {i} is not finite"
            )));
        }
        Ok(())
    }

    /// Pick the arm joints out of a full joint-space vector
    pub fn extract_arm(&self, full: &[f64]) -> Result<JointConfiguration> {
        self.arm_joints
            .iter()
            .map(|&j| {
                full.get(j).copied().ok_or_else(|| {
                    Error::Backend(format!(
                        "joint-space solution has {} entries, arm joint {} missing",
                        full.len(),
                        j
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(JointConfiguration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, PhysicsBackend};

    fn panda() -> RobotModel {
        RobotModel::from_joints(&MockBackend::new().joints(), 11).unwrap()
    }

    #[test]
    fn test_classifies_panda_layout() {
        let model = panda();
        assert_eq!(model.arm_joints(), &[0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(model.finger_joints(), &[9, 10]);
        assert_eq!(model.arm_dof(), 7);
        assert_eq!(model.num_joints(), 12);
    }

    #[test]
    fn test_rejects_missing_arm() {
        let joints = vec![JointInfo::new(0, "finger", JointKind::Prismatic)];
        assert!(matches!(
            RobotModel::from_joints(&joints, 0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_rejects_bad_end_effector() {
        let joints = MockBackend::new().joints();
        assert!(RobotModel::from_joints(&joints, 40).is_err());
    }

    #[test]
    fn test_validate_length() {
        let model = panda();
        assert!(model.validate(&[0.0; 7]).is_ok());
        assert!(matches!(
            model.validate(&[0.0; 6]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(model.validate(&[0.0, 0.0, 0.0, f64::NAN, 0.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn test_extract_arm() {
        let model = panda();
        let full: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let arm = model.extract_arm(&full).unwrap();
        assert_eq!(arm.as_slice(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(matches!(model.extract_arm(&full[..4]), Err(Error::Backend(_))));
    }

    #[test]
    fn test_max_abs_diff() {
        let a = JointConfiguration::new(vec![0.0, 1.0, 2.0]);
        let b = JointConfiguration::new(vec![0.1, 0.7, 2.0]);
        assert!((a.max_abs_diff(&b) - 0.3).abs() < 1e-12);
    }
}
