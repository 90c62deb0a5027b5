//! # Arm kinematic/actuator interface
//!
//! The servoing core never talks to the robot SDK directly. All kinematic
//! sensing (configuration, Jacobians, limits) and all actuation (velocity
//! demands, stop) go through the [`Arm`] trait, so the control modules can be
//! run against canned values from [`crate::mock::MockArm`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Ordered vector of per-joint angles.
///
/// Units: radians. Length: number of controlled joints (the terminal gripper
/// joint is not part of the servoed set).
pub type JointConfig = DVector<f64>;

/// Ordered vector of per-joint angular rate demands.
///
/// Units: radians/second. The only quantity that crosses the actuator
/// boundary each cycle.
pub type VelocityCommand = DVector<f64>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Mechanical position limits of the controlled joints, fixed for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointLimits {
    /// Lowest reachable position per joint.
    ///
    /// Units: radians
    pub min_rad: DVector<f64>,

    /// Highest reachable position per joint.
    ///
    /// Units: radians
    pub max_rad: DVector<f64>,
}

/// The Jacobians sensed from the arm in one snapshot.
#[derive(Debug, Clone)]
pub struct ArmJacobians {
    /// Jacobian of the end-effector expressed in the end-effector frame
    /// (task dimension rows are composed onto this by the controller).
    pub ee_jac: DMatrix<f64>,

    /// The same Jacobian expressed in the arm base frame. Consumed by the
    /// manipulability objective together with the derivative set.
    pub base_jac: DMatrix<f64>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors when talking to the arm equipment.
#[derive(Debug, thiserror::Error)]
pub enum ArmError {
    #[error("The arm equipment is not responding")]
    NotResponding,

    #[error("Could not read from the arm: {0}")]
    SenseError(String),

    #[error("Could not send demands to the arm: {0}")]
    DemandError(String),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// The kinematic/actuator boundary of the arm.
///
/// One snapshot of the sensed quantities is taken per control cycle and not
/// mutated mid-cycle, so all control modules work from consistent values.
pub trait Arm {
    /// Number of controlled joints.
    fn num_joints(&self) -> usize;

    /// Sense the current joint configuration.
    fn configuration(&mut self) -> Result<JointConfig, ArmError>;

    /// Sense the current end-effector and base-frame Jacobians.
    fn task_jacobian(&mut self) -> Result<ArmJacobians, ArmError>;

    /// Sense the derivative of the base-frame Jacobian with respect to each
    /// joint, evaluated at the current configuration. One matrix per joint,
    /// each the same shape as the base-frame Jacobian.
    fn jacobian_derivatives(&mut self) -> Result<Vec<DMatrix<f64>>, ArmError>;

    /// Get the per-joint mechanical limits. Fixed for the session.
    fn joint_limits(&self) -> Result<JointLimits, ArmError>;

    /// Dispatch a joint velocity demand.
    fn set_velocity(&mut self, dems: &VelocityCommand) -> Result<(), ArmError>;

    /// Bring all controlled joints to a commanded stop.
    fn stop(&mut self) -> Result<(), ArmError>;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointLimits {
    /// Number of joints covered by these limits.
    pub fn num_joints(&self) -> usize {
        self.min_rad.len()
    }

    /// Movement range of each joint.
    pub fn range_rad(&self) -> DVector<f64> {
        &self.max_rad - &self.min_rad
    }

    /// Middle position of each joint's range.
    pub fn middle_rad(&self) -> DVector<f64> {
        (&self.max_rad + &self.min_rad) * 0.5
    }

    /// Indices of joints whose limits are invalid (`max <= min`).
    pub fn invalid_joints(&self) -> Vec<usize> {
        (0..self.num_joints())
            .filter(|&i| self.max_rad[i] <= self.min_rad[i])
            .collect()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_joint_limits() {
        let limits = JointLimits {
            min_rad: DVector::from_vec(vec![-1.0, -2.0, 0.5]),
            max_rad: DVector::from_vec(vec![1.0, 2.0, 0.5]),
        };

        assert_eq!(limits.num_joints(), 3);
        assert_eq!(limits.range_rad()[1], 4.0);
        assert_eq!(limits.middle_rad()[0], 0.0);

        // Joint 2 is degenerate (max == min)
        assert_eq!(limits.invalid_joints(), vec![2]);
    }
}
