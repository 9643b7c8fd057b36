//! Math utilities: quaternions, poses and small vector helpers
//!
//! Built on top of nalgebra where a decomposition is needed; the hot paths
//! (pose composition, interpolation) are written out on plain arrays.

mod pose;
mod quaternion;

pub use pose::Pose;
pub use quaternion::Quaternion;

/// Type alias for 3D vectors
pub type Vector3 = nalgebra::Vector3<f64>;

/// Type alias for 4x4 matrices
pub type Matrix4 = nalgebra::Matrix4<f64>;

/// Linearly interpolate between two values
///
/// Exact at both endpoints.
#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a.mul_add(1.0 - t, b * t)
}

/// Element-wise linear interpolation between two equally sized slices
pub fn lerp_slice(start: &[f64], goal: &[f64], t: f64) -> Vec<f64> {
    debug_assert_eq!(start.len(), goal.len());
    start
        .iter()
        .zip(goal)
        .map(|(&a, &b)| lerp(a, b, t))
        .collect()
}

#[inline]
pub fn add3(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// Euclidean distance between two points
#[inline]
pub fn distance3(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx.mul_add(dx, dy.mul_add(dy, dz * dz)).sqrt()
}

/// Convert a slice into a 3-vector if it has exactly three finite entries
pub fn finite_vec3(values: &[f64]) -> Option<[f64; 3]> {
    match values {
        [x, y, z] if x.is_finite() && y.is_finite() && z.is_finite() => Some([*x, *y, *z]),
        _ => None,
    }
}
