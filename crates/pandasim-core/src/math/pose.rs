//! Rigid body pose (position + orientation)
//!
//! Used for the end-effector frame, object poses and camera placement.

use super::Quaternion;
use serde::{Deserialize, Serialize};

/// A rigid body pose in world coordinates
///
/// Serializes as `{"pos": [x, y, z], "orn_xyzw": [x, y, z, w]}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position in meters
    #[serde(rename = "pos")]
    pub position: [f64; 3],
    /// Orientation as a unit quaternion
    #[serde(rename = "orn_xyzw")]
    pub orientation: Quaternion,
}

impl Pose {
    #[inline]
    pub const fn new(position: [f64; 3], orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Identity pose (origin, no rotation)
    #[inline]
    pub const fn identity() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            orientation: Quaternion::identity(),
        }
    }

    /// Pure translation
    #[inline]
    pub const fn from_position(position: [f64; 3]) -> Self {
        Self {
            position,
            orientation: Quaternion::identity(),
        }
    }

    /// Pure rotation
    #[inline]
    pub const fn from_orientation(orientation: Quaternion) -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            orientation,
        }
    }

    /// Compose two poses: self * other
    ///
    /// The result represents applying `other` first, then `self`.
    #[inline]
    pub fn compose(&self, other: &Pose) -> Pose {
        let orientation = self.orientation.multiply(&other.orientation);
        Pose::new(self.transform_point(other.position), orientation)
    }

    /// Get the inverse pose
    #[inline]
    pub fn inverse(&self) -> Pose {
        let inv_orientation = self.orientation.inverse();
        let p = inv_orientation.rotate_vector(self.position);
        Pose::new([-p[0], -p[1], -p[2]], inv_orientation)
    }

    /// Transform a point from this frame into the parent frame
    #[inline]
    pub fn transform_point(&self, point: [f64; 3]) -> [f64; 3] {
        let r = self.orientation.rotate_vector(point);
        [
            r[0] + self.position[0],
            r[1] + self.position[1],
            r[2] + self.position[2],
        ]
    }

    /// Position shifted by a world-frame offset, orientation unchanged
    #[inline]
    pub fn translated(&self, offset: [f64; 3]) -> Pose {
        Pose::new(super::add3(self.position, offset), self.orientation)
    }

    /// Euclidean distance between the two positions
    #[inline]
    pub fn translation_distance(&self, other: &Pose) -> f64 {
        super::distance3(self.position, other.position)
    }

    /// Angular distance between the two orientations
    #[inline]
    pub fn angular_distance(&self, other: &Pose) -> f64 {
        self.orientation.angular_distance(&other.orientation)
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite()) && self.orientation.is_finite()
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for Pose {
    type Output = Pose;

    fn mul(self, rhs: Self) -> Self::Output {
        self.compose(&rhs)
    }
}
