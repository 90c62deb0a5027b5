//! Parameters structure for VisualServo

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Visual servoing control.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Params {
    // ---- ADAPTIVE GAIN ----

    /// Gain applied at zero task error.
    ///
    /// Units: none
    pub gain_zero: f64,

    /// Gain approached as the task error grows without bound. Must be
    /// strictly smaller than `gain_zero`.
    ///
    /// Units: none
    pub gain_inf: f64,

    /// Slope of the gain at zero task error.
    ///
    /// Units: 1/error
    pub gain_slope: f64,

    // ---- TASK ----

    /// If true only the translation part of the pose error is servoed and
    /// the task dimension is 3 instead of 6.
    pub translation_only: bool,

    /// Singular values of the task Jacobian below this threshold are treated
    /// as zero. The pseudo-inverse then falls back to the minimum-norm
    /// solution and the cycle is flagged as degenerate.
    ///
    /// Units: none
    pub sv_tolerance: f64,
}
