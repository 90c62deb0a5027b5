//! # Mock equipment
//!
//! Canned-value implementations of the equipment traits. These back the
//! control-module tests and the `sim` feature of the executable, which runs
//! the full control loop with no live robot or camera attached.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;

use log::trace;
use nalgebra::{DMatrix, DVector};

use crate::eqpt::arm::{Arm, ArmError, ArmJacobians, JointConfig, JointLimits, VelocityCommand};
use crate::eqpt::tracker::{PoseTracker, TrackerError};
use crate::pose::Pose;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Mock arm with canned kinematics.
///
/// All sensed values are public so tests can pin the exact configuration,
/// limits and Jacobians a scenario needs. Dispatched commands are recorded
/// rather than actuated.
pub struct MockArm {
    num_joints: usize,

    /// Canned joint configuration returned by `configuration`.
    pub config_rad: JointConfig,

    /// Canned joint limits.
    pub limits: JointLimits,

    /// Canned end-effector frame Jacobian.
    pub ee_jac: DMatrix<f64>,

    /// Canned base frame Jacobian.
    pub base_jac: DMatrix<f64>,

    /// Canned base-frame Jacobian derivatives, one per joint.
    pub derivatives: Vec<DMatrix<f64>>,

    /// Every velocity demand dispatched to this arm, oldest first.
    pub sent_demands: Vec<VelocityCommand>,

    /// Number of times `stop` has been commanded.
    pub num_stops: usize,

    /// When true all demand dispatches fail, simulating a lost link.
    pub fail_demands: bool,
}

/// Mock tracker that plays back a scripted sequence of pose estimates.
pub struct MockTracker {
    frames: VecDeque<Option<Pose>>,
    last: Option<Pose>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MockArm {
    /// Create a mock arm with `num_joints` joints.
    ///
    /// Defaults: all joints centred at zero with limits of +/- 2 radians, an
    /// identity-shaped 6 x n Jacobian in both frames and zero Jacobian
    /// derivatives. `num_joints` must be at least 6.
    pub fn new(num_joints: usize) -> Self {
        assert!(num_joints >= 6, "a redundant arm needs at least 6 joints");

        let mut jac = DMatrix::zeros(6, num_joints);
        for i in 0..6 {
            jac[(i, i)] = 1.0;
        }

        Self {
            num_joints,
            config_rad: DVector::zeros(num_joints),
            limits: JointLimits {
                min_rad: DVector::from_element(num_joints, -2.0),
                max_rad: DVector::from_element(num_joints, 2.0),
            },
            ee_jac: jac.clone(),
            base_jac: jac,
            derivatives: vec![DMatrix::zeros(6, num_joints); num_joints],
            sent_demands: vec![],
            num_stops: 0,
            fail_demands: false,
        }
    }

    /// The last dispatched velocity demand, if any.
    pub fn last_demand(&self) -> Option<&VelocityCommand> {
        self.sent_demands.last()
    }
}

impl Arm for MockArm {
    fn num_joints(&self) -> usize {
        self.num_joints
    }

    fn configuration(&mut self) -> Result<JointConfig, ArmError> {
        Ok(self.config_rad.clone())
    }

    fn task_jacobian(&mut self) -> Result<ArmJacobians, ArmError> {
        Ok(ArmJacobians {
            ee_jac: self.ee_jac.clone(),
            base_jac: self.base_jac.clone(),
        })
    }

    fn jacobian_derivatives(&mut self) -> Result<Vec<DMatrix<f64>>, ArmError> {
        Ok(self.derivatives.clone())
    }

    fn joint_limits(&self) -> Result<JointLimits, ArmError> {
        Ok(self.limits.clone())
    }

    fn set_velocity(&mut self, dems: &VelocityCommand) -> Result<(), ArmError> {
        if self.fail_demands {
            return Err(ArmError::NotResponding);
        }

        trace!("MockArm demand: {:?}", dems.as_slice());
        self.sent_demands.push(dems.clone());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ArmError> {
        if self.fail_demands {
            return Err(ArmError::NotResponding);
        }

        self.num_stops += 1;
        Ok(())
    }
}

impl MockTracker {
    /// Tracker that always sees the target at the given pose.
    pub fn fixed(pose: Pose) -> Self {
        Self {
            frames: VecDeque::new(),
            last: Some(pose),
        }
    }

    /// Tracker that never sees the target.
    pub fn lost() -> Self {
        Self {
            frames: VecDeque::new(),
            last: None,
        }
    }

    /// Tracker that plays the given frames in order, then repeats the final
    /// frame forever.
    pub fn sequence(frames: Vec<Option<Pose>>) -> Self {
        let mut frames: VecDeque<_> = frames.into();
        let last = frames.back().cloned().flatten();

        // Keep the last frame out of the queue so it repeats
        frames.pop_back();

        Self { frames, last }
    }
}

impl PoseTracker for MockTracker {
    fn try_get_pose(&mut self) -> Result<Option<Pose>, TrackerError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(frame),
            None => Ok(self.last),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn test_mock_arm_records_demands() {
        let mut arm = MockArm::new(7);

        let dems = DVector::from_element(7, 0.1);
        arm.set_velocity(&dems).unwrap();
        arm.stop().unwrap();

        assert_eq!(arm.sent_demands.len(), 1);
        assert_eq!(arm.num_stops, 1);
        assert_eq!(arm.last_demand().unwrap()[3], 0.1);
    }

    #[test]
    fn test_mock_tracker_sequence() {
        let pose = Pose::from_parts(
            Translation3::new(0.1, 0.0, 0.0),
            UnitQuaternion::identity(),
        );

        let mut tracker = MockTracker::sequence(vec![Some(pose), None, Some(pose)]);

        assert!(tracker.try_get_pose().unwrap().is_some());
        assert!(tracker.try_get_pose().unwrap().is_none());
        assert!(tracker.try_get_pose().unwrap().is_some());

        // Final frame repeats
        assert!(tracker.try_get_pose().unwrap().is_some());
    }
}
