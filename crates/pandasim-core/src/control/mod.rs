//! Motion and grasp control
//!
//! Both are `impl` blocks on [`SimSession`](crate::SimSession): every
//! operation advances the backend tick by tick and logs a pose per tick.

mod grasp;
mod motion;

pub use grasp::{GraspMethod, GraspOutcome, GraspState};
pub use motion::{interpolation_steps, CancelToken};
