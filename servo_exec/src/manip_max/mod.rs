//! # Manipulability maximisation control module
//!
//! Secondary objective that climbs the gradient of the manipulability
//! measure `w = sqrt(det(J * J^T))`. The gradient with respect to joint `i`
//! is `w * trace(dJ/dq_i * J^+)`, scaled by a fixed damping factor. The
//! correction is returned already projected into the task nullspace, so
//! adding it to the primary command does not change the instantaneous
//! task-space velocity to first order.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during ManipMax operation.
#[derive(Debug, thiserror::Error)]
pub enum ManipMaxError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Expected {expected} Jacobian derivatives, got {got}")]
    DerivativeCountMismatch { expected: usize, got: usize },

    #[error(
        "Jacobian derivative {index} is {rows}x{cols}, expected {exp_rows}x{exp_cols}"
    )]
    DerivativeShapeMismatch {
        index: usize,
        rows: usize,
        cols: usize,
        exp_rows: usize,
        exp_cols: usize,
    },

    #[error("Nullspace projector is {rows}x{cols}, expected {num_joints}x{num_joints}")]
    ProjectorDimMismatch {
        rows: usize,
        cols: usize,
        num_joints: usize,
    },

    #[error("Could not compute the Jacobian pseudo-inverse: {0}")]
    PseudoInverseFailed(&'static str),
}
