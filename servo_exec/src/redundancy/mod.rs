//! # Redundancy resolution control module
//!
//! Combines the primary visual servoing command with the nullspace-projected
//! secondary objectives into the single velocity command dispatched to the
//! arm, and owns the session state machine
//! (`Uninit -> Tracking -> Servoing -> Stopped`).
//!
//! Secondary objectives are summed with configurable weights and projected
//! through `P = I - J^+ J` in one place, so further objectives can be added
//! without touching the primary controller.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::DMatrix;

// Internal
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Compute the nullspace projector `P = I - J^+ J` of the task Jacobian.
///
/// `P` maps any joint velocity into the subspace producing zero task-space
/// velocity. It is idempotent, projecting an already projected vector is
/// exact, which lets secondary objectives pre-project their own output.
///
/// Must be computed from the same per-cycle Jacobian snapshot the primary
/// command used.
pub fn nullspace_projector(
    task_jac: &DMatrix<f64>,
    task_jac_pinv: &DMatrix<f64>,
) -> DMatrix<f64> {
    let num_joints = task_jac.ncols();

    DMatrix::identity(num_joints, num_joints) - task_jac_pinv * task_jac
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during Redundancy operation.
#[derive(Debug, thiserror::Error)]
pub enum RedundancyError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error(
        "Invalid convergence parameters: err_norm = {err_norm}, cycles = {cycles}"
    )]
    InvalidConvergence { err_norm: f64, cycles: u64 },

    #[error("Secondary correction has {got} joints, expected {expected}")]
    SecondaryDimMismatch { got: usize, expected: usize },

    #[error("Primary command has {got} joints, expected {expected}")]
    PrimaryDimMismatch { got: usize, expected: usize },
}
