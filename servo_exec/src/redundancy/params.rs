//! Parameters structure for Redundancy

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Redundancy resolution.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Params {
    // ---- SECONDARY OBJECTIVE WEIGHTS ----

    /// Weight applied to the joint limit avoidance correction before
    /// projection.
    ///
    /// Units: none
    pub limit_avoid_weight: f64,

    /// Weight applied to the manipulability correction before projection.
    ///
    /// Units: none
    pub manip_weight: f64,

    // ---- CONVERGENCE ----

    /// Task error norm below which a cycle counts toward convergence.
    ///
    /// Units: task error norm
    pub converge_err_norm: f64,

    /// Number of consecutive converged cycles required to declare the servo
    /// complete and stop.
    pub converge_cycles: u64,
}
