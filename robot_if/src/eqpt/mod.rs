//! # Equipment interfaces
//!
//! Traits and types for the equipment the servoing executable talks to: the
//! arm's kinematic/actuator proxy and the target pose tracker.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod arm;
pub mod tracker;
