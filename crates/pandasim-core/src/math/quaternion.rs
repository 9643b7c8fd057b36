//! Quaternion implementation for 3D rotations
//!
//! Wrapper around nalgebra's UnitQuaternion. Components are stored and
//! serialized in `x, y, z, w` order, the order the physics backends report.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// A unit quaternion representing a 3D rotation
///
/// `w` is the scalar part. Serializes as a flat `[x, y, z, w]` array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Quaternion {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
    /// Z component
    pub z: f64,
    /// Scalar component (w)
    pub w: f64,
}

impl Quaternion {
    /// Create a new quaternion from `x, y, z, w` components (automatically normalized)
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        let mut q = Self { x, y, z, w };
        q.normalize();
        q
    }

    /// Identity quaternion (no rotation)
    pub const fn identity() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }

    /// Create from an `[x, y, z, w]` array (normalized)
    pub fn from_xyzw(xyzw: [f64; 4]) -> Self {
        Self::new(xyzw[0], xyzw[1], xyzw[2], xyzw[3])
    }

    /// Components as `[x, y, z, w]`
    pub fn to_xyzw(&self) -> [f64; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// Create from Euler angles (roll, pitch, yaw) in radians
    ///
    /// Uses ZYX convention (yaw around Z, then pitch around Y, then roll around X)
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self::from_nalgebra(UnitQuaternion::from_euler_angles(roll, pitch, yaw))
    }

    /// Create from axis-angle representation
    pub fn from_axis_angle(axis: [f64; 3], angle: f64) -> Self {
        let axis_vec = Vector3::new(axis[0], axis[1], axis[2]);
        match nalgebra::Unit::try_new(axis_vec, 1e-10) {
            Some(unit_axis) => Self::from_nalgebra(UnitQuaternion::from_axis_angle(&unit_axis, angle)),
            None => Self::identity(),
        }
    }

    /// Convert from nalgebra's UnitQuaternion
    pub fn from_nalgebra(uq: UnitQuaternion<f64>) -> Self {
        Self {
            x: uq.i,
            y: uq.j,
            z: uq.k,
            w: uq.w,
        }
    }

    /// Convert to nalgebra's UnitQuaternion
    pub fn to_nalgebra(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(self.w, self.x, self.y, self.z))
    }

    /// Multiply two quaternions (compose rotations)
    ///
    /// Hamilton product written out directly, no nalgebra round trip.
    #[inline]
    pub fn multiply(&self, other: &Quaternion) -> Quaternion {
        Self {
            x: self.w.mul_add(
                other.x,
                self.x
                    .mul_add(other.w, self.y.mul_add(other.z, -self.z * other.y)),
            ),
            y: self.w.mul_add(
                other.y,
                (-self.x).mul_add(other.z, self.y.mul_add(other.w, self.z * other.x)),
            ),
            z: self.w.mul_add(
                other.z,
                self.x
                    .mul_add(other.y, (-self.y).mul_add(other.x, self.z * other.w)),
            ),
            w: self.w.mul_add(
                other.w,
                (-self.x).mul_add(other.x, (-self.y).mul_add(other.y, -self.z * other.z)),
            ),
        }
    }

    /// Get the inverse quaternion
    ///
    /// For a unit quaternion, the inverse is the conjugate.
    #[inline]
    pub fn inverse(&self) -> Quaternion {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
            w: self.w,
        }
    }

    /// Rotate a 3D vector
    ///
    /// v' = v + 2w(q x v) + 2(q x (q x v)) where q = (x, y, z) is the vector part.
    #[inline]
    pub fn rotate_vector(&self, v: [f64; 3]) -> [f64; 3] {
        let qv = [self.x, self.y, self.z];
        let uv = [
            qv[1].mul_add(v[2], -qv[2] * v[1]),
            qv[2].mul_add(v[0], -qv[0] * v[2]),
            qv[0].mul_add(v[1], -qv[1] * v[0]),
        ];
        let uuv = [
            qv[1].mul_add(uv[2], -qv[2] * uv[1]),
            qv[2].mul_add(uv[0], -qv[0] * uv[2]),
            qv[0].mul_add(uv[1], -qv[1] * uv[0]),
        ];
        [
            2.0f64.mul_add(self.w.mul_add(uv[0], uuv[0]), v[0]),
            2.0f64.mul_add(self.w.mul_add(uv[1], uuv[1]), v[1]),
            2.0f64.mul_add(self.w.mul_add(uv[2], uuv[2]), v[2]),
        ]
    }

    /// Rotation taking `self` onto `target`, as a scaled axis (axis * angle)
    ///
    /// Always the short way around.
    pub fn rotation_error(&self, target: &Quaternion) -> [f64; 3] {
        let delta = target.to_nalgebra() * self.to_nalgebra().inverse();
        let v = delta.scaled_axis();
        [v.x, v.y, v.z]
    }

    #[inline]
    fn normalize(&mut self) {
        let norm_sq = self.norm_squared();
        if norm_sq > 1e-20 {
            let inv_norm = 1.0 / norm_sq.sqrt();
            self.x *= inv_norm;
            self.y *= inv_norm;
            self.z *= inv_norm;
            self.w *= inv_norm;
        }
    }

    /// Squared magnitude
    #[inline]
    pub fn norm_squared(&self) -> f64 {
        self.w.mul_add(
            self.w,
            self.x
                .mul_add(self.x, self.y.mul_add(self.y, self.z * self.z)),
        )
    }

    /// Dot product between two quaternions
    #[inline]
    pub fn dot(&self, other: &Quaternion) -> f64 {
        self.w.mul_add(
            other.w,
            self.x
                .mul_add(other.x, self.y.mul_add(other.y, self.z * other.z)),
        )
    }

    /// Angular distance between two quaternions in radians
    #[inline]
    pub fn angular_distance(&self, other: &Quaternion) -> f64 {
        let dot = self.dot(other).abs().min(1.0);
        2.0 * dot.acos()
    }

    /// True if every component is finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.w.is_finite()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[f64; 4]> for Quaternion {
    fn from(xyzw: [f64; 4]) -> Self {
        Self::from_xyzw(xyzw)
    }
}

impl From<Quaternion> for [f64; 4] {
    fn from(q: Quaternion) -> Self {
        q.to_xyzw()
    }
}

impl std::ops::Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, rhs: Self) -> Self::Output {
        self.multiply(&rhs)
    }
}
