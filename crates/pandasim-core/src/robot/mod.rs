//! Robot state model
//!
//! Joint classification, the end-effector frame and the canonical home
//! configuration of the Panda arm.

mod model;

pub use model::{JointConfiguration, RobotModel};

/// Number of arm joints on the Panda
pub const PANDA_ARM_DOF: usize = 7;

/// Link index of the Panda grasp-target frame (between the fingertips)
pub const PANDA_END_EFFECTOR_LINK: usize = 11;

/// Home configuration the arm is reset to at session start
pub const HOME_CONFIGURATION: [f64; PANDA_ARM_DOF] = [0.0, -0.4, 0.0, -2.0, 0.0, 1.7, 0.8];
