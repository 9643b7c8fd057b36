//! Motion executor: joint-space linear interpolation at a fixed timestep

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::backend::PhysicsBackend;
use crate::math::{finite_vec3, lerp_slice, Quaternion};
use crate::robot::JointConfiguration;
use crate::session::SimSession;
use crate::{Error, Result};

/// Cooperative cancellation flag for in-flight motion
///
/// Cloned handles share one flag. Motion checks it between ticks, so a
/// cancelled move stops on a tick boundary with every completed tick logged.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clear a previous request so the token can be reused
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Number of interpolation ticks for a move: `max(1, floor(duration / timestep))`
#[inline]
pub fn interpolation_steps(duration: f64, timestep: f64) -> usize {
    ((duration / timestep).floor() as usize).max(1)
}

impl<B: PhysicsBackend> SimSession<B> {
    /// Move the arm to `target` over `duration` seconds
    ///
    /// Returns the arm configuration read back after the last tick.
    pub fn move_joints(&mut self, target: &[f64], duration: f64) -> Result<JointConfiguration> {
        self.execute_joint_move(target, duration, None)
    }

    /// [`move_joints`](Self::move_joints) that stops early when `cancel` is set
    pub fn move_joints_with_cancel(
        &mut self,
        target: &[f64],
        duration: f64,
        cancel: &CancelToken,
    ) -> Result<JointConfiguration> {
        self.execute_joint_move(target, duration, Some(cancel))
    }

    /// Move the end-effector to a Cartesian pose via backend IK
    ///
    /// Keeps the current end-effector orientation when `orientation` is
    /// `None`. The IK result is executed as-is, with no retry.
    pub fn move_cartesian(
        &mut self,
        position: &[f64],
        orientation: Option<Quaternion>,
        duration: f64,
    ) -> Result<JointConfiguration> {
        self.execute_cartesian_move(position, orientation, duration, None)
    }

    /// [`move_cartesian`](Self::move_cartesian) that stops early when `cancel` is set
    pub fn move_cartesian_with_cancel(
        &mut self,
        position: &[f64],
        orientation: Option<Quaternion>,
        duration: f64,
        cancel: &CancelToken,
    ) -> Result<JointConfiguration> {
        self.execute_cartesian_move(position, orientation, duration, Some(cancel))
    }

    fn execute_cartesian_move(
        &mut self,
        position: &[f64],
        orientation: Option<Quaternion>,
        duration: f64,
        cancel: Option<&CancelToken>,
    ) -> Result<JointConfiguration> {
        let position = finite_vec3(position)
            .ok_or_else(|| Error::InvalidArgument("pos must be [x,y,z] with finite values".into()))?;
        if let Some(q) = orientation.filter(|q| !q.is_finite() || q.norm_squared() < 1e-12) {
            return Err(Error::InvalidArgument(format!(
                "orn must be a non-zero finite quaternion, got {:?}",
                q.to_xyzw()
            )));
        }
        validate_duration(duration)?;

        let orientation = match orientation {
            Some(q) => q,
            None => self.end_effector_pose()?.orientation,
        };
        let solution = self.backend.inverse_kinematics(
            self.model.end_effector_link(),
            position,
            orientation,
        )?;
        let target = self.model.extract_arm(&solution)?;
        if let Some(i) = target.as_slice().iter().position(|v| !v.is_finite()) {
            return Err(Error::Backend(format!(
                "IK returned a non-finite value for arm joint {i}"
            )));
        }
        tracing::debug!(?position, target = ?target.as_slice(), "IK solution");

        self.execute_joint_move(target.as_slice(), duration, cancel)
    }

    fn execute_joint_move(
        &mut self,
        target: &[f64],
        duration: f64,
        cancel: Option<&CancelToken>,
    ) -> Result<JointConfiguration> {
        self.model.validate(target)?;
        validate_duration(duration)?;

        let start = self.joint_positions()?;
        let timestep = self.config.motion.timestep;
        let steps = interpolation_steps(duration, timestep);
        let force = self.config.motion.arm_force;
        let pause = self
            .config
            .motion
            .realtime
            .then(|| Duration::from_secs_f64(timestep));

        tracing::debug!(steps, duration, "joint move started");

        for k in 1..=steps {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                tracing::info!(completed = k - 1, steps, "joint move cancelled");
                return Err(Error::Cancelled {
                    completed_steps: k - 1,
                });
            }

            let alpha = k as f64 / steps as f64;
            let q = lerp_slice(start.as_slice(), target, alpha);
            self.backend
                .set_position_targets(self.model.arm_joints(), &q, force)?;
            self.advance()?;
            tracing::trace!(step = k, alpha, "joint move tick");

            if let Some(pause) = pause {
                thread::sleep(pause);
            }
        }

        let reached = self.joint_positions()?;
        tracing::debug!(
            error = reached.max_abs_diff(&JointConfiguration::from(target)),
            "joint move finished"
        );
        Ok(reached)
    }
}

fn validate_duration(duration: f64) -> Result<()> {
    if duration.is_finite() && duration >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "duration must be a non-negative number of seconds, got {duration}"
        )))
    }
}
