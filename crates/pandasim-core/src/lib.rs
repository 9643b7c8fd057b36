//! pandasim-core: simulation control for a Panda arm, its gripper and a cube
//!
//! A stateful session that drives a physics backend in fixed ticks: joint and
//! Cartesian motion by linear interpolation, a binary weld-based grasp, a
//! bounded pose history and camera snapshots.
//!
//! # Modules
//!
//! - [`backend`] - Physics backend trait and a kinematic mock
//! - [`session`] - Robot state model, object spawning and pose queries
//! - [`control`] - Motion executor and grasp controller
//! - [`pose_log`] - Fixed-capacity pose history
//! - [`capture`] - Fixed-camera snapshots
//! - [`config`] - Session configuration
//! - [`math`] - Quaternion and pose utilities
//! - [`robot`] - Joint classification and Panda constants
//!
//! # Architecture
//!
//! ```text
//! caller ──► SimSession ──► PhysicsBackend
//!               │  ▲             (step, IK, constraints, render)
//!               ▼  │
//!            PoseLog (one entry per tick)
//! ```
//!
//! Every operation runs to completion on the caller's thread. Hosts that
//! serve several clients wrap the session in a [`SharedSession`].

#![warn(unused_must_use)]

pub mod backend;
pub mod capture;
pub mod config;
pub mod control;
pub mod math;
pub mod pose_log;
pub mod robot;
pub mod session;

use std::path::PathBuf;

// Re-exports for convenience
pub use backend::{BodyId, ConstraintId, MockBackend, MockBackendConfig, PhysicsBackend};
pub use config::SessionConfig;
pub use control::{CancelToken, GraspMethod, GraspOutcome, GraspState};
pub use math::{Pose, Quaternion};
pub use pose_log::{PoseLog, PoseLogEntry};
pub use robot::{JointConfiguration, RobotModel};
pub use session::{PoseSample, SessionStatus, SharedSession, SimSession};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for pandasim-core
///
/// Argument errors are raised before anything is sent to the backend, so a
/// rejected call leaves the session untouched. Backend errors raised mid-move
/// leave every tick completed so far applied and logged.
///
/// # Example
/// ```ignore
/// match sim.move_joints(&target, 2.0) {
///     Ok(reached) => println!("reached {:?}", reached),
///     Err(Error::InvalidArgument(msg)) => eprintln!("bad request: {}", msg),
///     Err(Error::Cancelled { completed_steps }) => eprintln!("stopped after {}", completed_steps),
///     Err(e) => return Err(e),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
#[must_use = "errors must be handled or explicitly ignored with let _ = ..."]
#[non_exhaustive]
pub enum Error {
    /// Malformed request (wrong target length, non-finite values, negative duration).
    /// Handle by: fixing the request; nothing was executed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation needs a spawned object and there is none.
    /// Handle by: spawning an object first, or using the `bool`-returning grasp calls.
    #[error("No object present")]
    NoObjectPresent,

    /// Physics backend rejected a call (unknown handle, failed step, failed IK).
    /// Handle by: inspecting session state; completed ticks remain applied.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Backend could not produce a camera frame.
    /// Handle by: checking camera resolution and backend rendering support.
    #[error("Render error: {0}")]
    Render(String),

    /// Filesystem error while writing a snapshot or log export.
    /// Handle by: checking the path exists and is writable.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Image encoding failed.
    /// Handle by: choosing a supported file extension.
    #[error("Image error: {0}")]
    Image(String),

    /// JSON encoding or decoding failed.
    /// Handle by: checking the input document.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Motion stopped by a cancel token.
    /// Handle by: re-issuing the move from the current configuration if needed.
    #[error("Cancelled after {completed_steps} steps")]
    Cancelled { completed_steps: usize },

    /// Invalid configuration parameter.
    /// Handle by: validating config before use, checking parameter ranges.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for pandasim-core operations
pub type Result<T> = std::result::Result<T, Error>;
