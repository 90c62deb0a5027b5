//! # Arm servoing executable library
//!
//! Control modules and support code for `servo_exec`. Each control module
//! (e.g. `visual_servo`) implements the `util::module::State` trait and is
//! processed once per control cycle by the executable's main loop.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod data_store;
pub mod limit_avoid;
pub mod manip_max;
pub mod params;
pub mod pose_store;
pub mod redundancy;
pub mod tm;
pub mod visual_servo;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of control cycles per second. Matched to the tracker framerate.
pub const CYCLE_FREQUENCY_HZ: f64 = 15.0;

/// Target period of one control cycle.
pub const CYCLE_PERIOD_S: f64 = 1.0 / CYCLE_FREQUENCY_HZ;
