//! # Target pose tracker interface
//!
//! The fiducial tracker is an external collaborator. Per cycle it either
//! yields a camera-to-target pose estimate or reports the target as not
//! found. Acquisition must return within one control period; a tracker that
//! cannot is treated as "target not found" for the cycle by the caller.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::pose::Pose;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors when acquiring a pose estimate.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("The tracker did not return within the control period")]
    AcquisitionTimeout,

    #[error("Tracker fault: {0}")]
    TrackerFault(String),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Per-cycle pose estimate source.
pub trait PoseTracker {
    /// Attempt to get the current camera-to-target pose.
    ///
    /// Returns `Ok(None)` when the target is not visible this cycle.
    fn try_get_pose(&mut self) -> Result<Option<Pose>, TrackerError>;
}
