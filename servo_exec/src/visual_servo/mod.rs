//! # Visual servoing control module
//!
//! The primary task controller. Each cycle it builds the pose error between
//! the tracked target and the learned desired target, composes the task
//! Jacobian from the sensed end-effector Jacobian and the fixed
//! target-to-end-effector twist, and produces the primary joint velocity
//! command `q1 = -lambda * J^+ * e` with an adaptive gain.
//!
//! The error vector, task Jacobian and its pseudo-inverse are exposed in the
//! module output so the secondary objectives and the redundancy resolver
//! work from the same per-cycle snapshot.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod adaptive_gain;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use adaptive_gain::*;
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Task dimension when both translation and rotation are servoed.
pub const FULL_TASK_DIM: usize = 6;

/// Task dimension when only translation is servoed.
pub const TRANS_TASK_DIM: usize = 3;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during VisualServo operation.
#[derive(Debug, thiserror::Error)]
pub enum VisualServoError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error(
        "Invalid gain parameters: gain_zero = {gain_zero}, gain_inf = {gain_inf}, \
         slope = {slope} (expected gain_zero > gain_inf > 0 and slope > 0)"
    )]
    InvalidGains {
        gain_zero: f64,
        gain_inf: f64,
        slope: f64,
    },

    #[error(
        "End-effector Jacobian is {rows}x{cols}, expected {exp_rows}x{exp_cols}"
    )]
    JacobianDimMismatch {
        rows: usize,
        cols: usize,
        exp_rows: usize,
        exp_cols: usize,
    },

    #[error("Could not compute the task Jacobian pseudo-inverse: {0}")]
    PseudoInverseFailed(&'static str),
}
