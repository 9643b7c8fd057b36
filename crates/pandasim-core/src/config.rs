//! Session configuration
//!
//! Every threshold here is a demo-tuned constant. They are kept as named
//! defaults rather than derived from the arm's physical limits.

use serde::{Deserialize, Serialize};

use crate::backend::DynamicsProperties;
use crate::robot::{HOME_CONFIGURATION, PANDA_END_EFFECTOR_LINK};
use crate::{Error, Result};

/// Motion executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Interpolation timestep in seconds (one backend tick per timestep)
    pub timestep: f64,
    /// Force limit for every arm joint motor
    pub arm_force: f64,
    /// Sleep one timestep of wall-clock time per tick
    pub realtime: bool,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            timestep: 0.01, // 100 Hz
            arm_force: 87.0,
            realtime: false,
        }
    }
}

/// Gripper aperture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GripperConfig {
    /// Fully open aperture in meters
    pub max_width: f64,
    /// Force limit for each finger motor
    pub finger_force: f64,
    /// Ticks to run after every aperture command
    pub settle_steps: usize,
    /// Wall-clock pause per settle tick when pacing is on
    pub settle_pause: f64,
    /// Aperture commanded after a release
    pub release_width: f64,
}

impl Default for GripperConfig {
    fn default() -> Self {
        Self {
            max_width: 0.08,
            finger_force: 20.0,
            settle_steps: 30,
            settle_pause: 0.005,
            release_width: 0.05,
        }
    }
}

/// Grasp heuristics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraspConfig {
    /// Apertures at or below this trigger an auto-grasp attempt
    pub close_threshold: f64,
    /// End-effector to object distance under which a grasp counts as real
    pub distance_threshold: f64,
    /// Weld offset expressed in the end-effector frame
    pub constraint_offset: [f64; 3],
    /// World-frame offset used when snapping the object under the gripper
    pub align_offset: [f64; 3],
}

impl Default for GraspConfig {
    fn default() -> Self {
        Self {
            close_threshold: 0.01,
            distance_threshold: 0.08,
            constraint_offset: [0.0, 0.0, 0.035],
            align_offset: [0.0, 0.0, -0.06],
        }
    }
}

/// Fixed snapshot camera
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Point the camera orbits and looks at
    pub target: [f64; 3],
    /// Distance from the target in meters
    pub distance: f64,
    /// Degrees around the world z axis
    pub yaw: f64,
    /// Degrees above (positive) or below (negative) the horizon
    pub pitch: f64,
    /// Degrees around the viewing axis
    pub roll: f64,
    /// Vertical field of view in degrees
    pub fov: f64,
    pub near: f64,
    pub far: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            target: [0.4, 0.0, 0.2],
            distance: 1.1,
            yaw: 45.0,
            pitch: -30.0,
            roll: 0.0,
            fov: 60.0,
            near: 0.01,
            far: 3.0,
            width: 640,
            height: 480,
        }
    }
}

impl CameraConfig {
    /// Set the output resolution
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn aspect(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Pose history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseLogConfig {
    /// Maximum retained entries; older ones are overwritten
    pub capacity: usize,
}

impl Default for PoseLogConfig {
    fn default() -> Self {
        Self { capacity: 5000 }
    }
}

/// Manipulated object configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectConfig {
    /// Spawn position used when the caller gives none
    pub default_position: [f64; 3],
    /// Cube half edge length in meters
    pub half_extent: f64,
    pub dynamics: DynamicsProperties,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            default_position: [0.5, 0.0, 0.025],
            half_extent: 0.025,
            dynamics: DynamicsProperties::default(),
        }
    }
}

/// Overall session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub motion: MotionConfig,
    pub gripper: GripperConfig,
    pub grasp: GraspConfig,
    pub camera: CameraConfig,
    pub pose_log: PoseLogConfig,
    pub object: ObjectConfig,
    /// Arm configuration applied on reset
    pub home: Vec<f64>,
    /// Link index used as the end-effector frame
    pub end_effector_link: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            motion: MotionConfig::default(),
            gripper: GripperConfig::default(),
            grasp: GraspConfig::default(),
            camera: CameraConfig::default(),
            pose_log: PoseLogConfig::default(),
            object: ObjectConfig::default(),
            home: HOME_CONFIGURATION.to_vec(),
            end_effector_link: PANDA_END_EFFECTOR_LINK,
        }
    }
}

impl SessionConfig {
    /// Config that paces every tick against the wall clock
    pub fn realtime() -> Self {
        let mut config = Self::default();
        config.motion.realtime = true;
        config
    }

    /// Parse a (possibly partial) JSON config; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the pose log capacity
    pub fn with_pose_log_capacity(mut self, capacity: usize) -> Self {
        self.pose_log.capacity = capacity;
        self
    }

    /// Set the interpolation timestep
    pub fn with_timestep(mut self, timestep: f64) -> Self {
        self.motion.timestep = timestep;
        self
    }

    /// Set the home configuration
    pub fn with_home(mut self, home: impl Into<Vec<f64>>) -> Self {
        self.home = home.into();
        self
    }

    /// Set the camera
    pub fn with_camera(mut self, camera: CameraConfig) -> Self {
        self.camera = camera;
        self
    }

    /// Check ranges; arm-specific checks happen once the backend is known
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(Error::Config(format!("{name} must be positive, got {value}")))
            }
        }

        positive("motion.timestep", self.motion.timestep)?;
        positive("motion.arm_force", self.motion.arm_force)?;
        positive("gripper.max_width", self.gripper.max_width)?;
        positive("gripper.finger_force", self.gripper.finger_force)?;
        positive("grasp.distance_threshold", self.grasp.distance_threshold)?;
        positive("camera.distance", self.camera.distance)?;
        positive("camera.fov", self.camera.fov)?;
        positive("camera.near", self.camera.near)?;
        positive("object.half_extent", self.object.half_extent)?;

        if self.pose_log.capacity == 0 {
            return Err(Error::Config("pose_log.capacity must be at least 1".into()));
        }
        if self.camera.far <= self.camera.near {
            return Err(Error::Config(format!(
                "camera.far ({}) must exceed camera.near ({})",
                self.camera.far, self.camera.near
            )));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(Error::Config("camera resolution must be non-zero".into()));
        }
        if !(0.0..=self.gripper.max_width).contains(&self.gripper.release_width) {
            return Err(Error::Config(format!(
                "gripper.release_width {} outside [0, {}]",
                self.gripper.release_width, self.gripper.max_width
            )));
        }
        if self.home.iter().any(|v| !v.is_finite()) {
            return Err(Error::Config("home configuration must be finite".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.motion.timestep, 0.01);
        assert_eq!(config.motion.arm_force, 87.0);
        assert_eq!(config.gripper.settle_steps, 30);
        assert_eq!(config.pose_log.capacity, 5000);
        assert_eq!(config.home, HOME_CONFIGURATION.to_vec());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SessionConfig::from_json_str(
            r#"{"pose_log": {"capacity": 10}, "grasp": {"distance_threshold": 0.05}}"#,
        )
        .unwrap();
        assert_eq!(config.pose_log.capacity, 10);
        assert_eq!(config.grasp.distance_threshold, 0.05);
        assert_eq!(config.grasp.close_threshold, 0.01);
        assert_eq!(config.camera.width, 640);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(SessionConfig::default().with_timestep(0.0).validate().is_err());
        assert!(SessionConfig::default()
            .with_pose_log_capacity(0)
            .validate()
            .is_err());
        assert!(matches!(
            SessionConfig::from_json_str("{not json"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_realtime_preset() {
        assert!(SessionConfig::realtime().motion.realtime);
        assert!(!SessionConfig::default().motion.realtime);
    }
}
