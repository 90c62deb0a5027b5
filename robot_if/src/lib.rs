//! # Robot equipment interface crate.
//!
//! Provides the pose and joint-space types exchanged with the robot's
//! equipment, and the traits behind which the live equipment (or the mock
//! used for testing) sits.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Pose and twist types
pub mod pose;

/// Equipment traits and joint-space types (arm and pose tracker)
pub mod eqpt;

/// Mock equipment, the test and simulation backend
pub mod mock;
