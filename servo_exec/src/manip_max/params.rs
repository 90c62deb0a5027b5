//! Parameters structure for ManipMax

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Manipulability maximisation.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Params {
    /// Damping factor applied to the manipulability gradient.
    ///
    /// Units: none
    pub alpha: f64,

    /// Singular values below this threshold are treated as zero when
    /// inverting the Jacobian.
    ///
    /// Units: none
    pub sv_tolerance: f64,
}
