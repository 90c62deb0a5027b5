//! Parameters structure for LimitAvoid

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Joint limit avoidance.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Params {
    // ---- ACTIVATION BANDS ----

    /// Relative width of the inactive region at each end of a joint's range.
    /// The inner activation boundary sits at `min + rho * range` and
    /// `max - rho * range`. Must be in (0, 1).
    ///
    /// Units: fraction of joint range
    pub rho: f64,

    /// Relative width of the transition band, as a fraction of `rho`. The
    /// outer boundary sits a further `rho * rho1 * range` toward the limit.
    /// Must be in (0, 1).
    ///
    /// Units: fraction of `rho * range`
    pub rho1: f64,

    // ---- CORRECTION ----

    /// Magnitude at which the repulsive correction saturates.
    ///
    /// Units: radians/second
    pub max_rate_rads: f64,
}
