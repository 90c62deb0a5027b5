//! # Joint limit avoidance control module
//!
//! Secondary objective that repels the configuration from its mechanical
//! limits. Two relative activation widths define, per joint, an inner band
//! in which no correction is applied and an outer band in which the
//! correction ramps up smoothly, saturating beyond it.
//!
//! The produced correction is raw joint-space motion. It must be projected
//! into the task nullspace by the redundancy resolver before being summed
//! with the primary command, otherwise it would disturb the primary task.

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

/// Possible errors that can occur during LimitAvoid operation.
#[derive(Debug, thiserror::Error)]
pub enum LimitAvoidError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Activation width {name} = {value} is outside (0, 1)")]
    InvalidActivationWidth { name: &'static str, value: f64 },

    #[error(
        "Joint {joint} has invalid limits: min = {min_rad} rad, max = {max_rad} rad"
    )]
    InvalidJointLimits {
        joint: usize,
        min_rad: f64,
        max_rad: f64,
    },

    #[error("Configuration has {got} joints, limits cover {expected}")]
    ConfigDimMismatch { got: usize, expected: usize },
}
