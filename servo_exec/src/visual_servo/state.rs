//! Implementations for the VisualServo state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

// Internal
use super::{AdaptiveGain, Params, VisualServoError, FULL_TASK_DIM, TRANS_TASK_DIM};
use robot_if::eqpt::arm::VelocityCommand;
use robot_if::pose::{vel_twist, Pose, PoseVec};
use util::{
    archive::{Archived, Archiver},
    module::State,
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Visual servoing control module state
pub struct VisualServo {
    pub(crate) params: Params,

    gain: AdaptiveGain,

    /// Velocity twist of the fixed target-to-end-effector transform, applied
    /// to the sensed end-effector Jacobian to form the task Jacobian.
    target_twist: DMatrix<f64>,

    num_joints: usize,

    pub(crate) report: StatusReport,
    arch_report: Archiver,
}

/// Data required to initialise VisualServo.
pub struct VisualServoInit {
    /// Path to the parameter file, relative to the params directory.
    pub params_path: &'static str,

    /// Fixed transform from the target frame to the arm end-effector frame.
    pub target_m_ee: Pose,

    /// Number of controlled joints.
    pub num_joints: usize,
}

/// Input data to Visual servoing control.
pub struct InputData {
    /// Current camera-to-target pose estimate, or `None` if the target is
    /// not tracked this cycle.
    pub target_pose: Option<Pose>,

    /// Learned desired camera-to-target pose.
    pub desired_pose: Pose,

    /// End-effector Jacobian sensed from the arm this cycle.
    pub ee_jac: DMatrix<f64>,
}

/// Output command and per-cycle snapshots from VisualServo.
///
/// The task Jacobian and its pseudo-inverse are part of the output so that
/// the secondary objectives and the redundancy resolver consume exactly the
/// values the primary command was computed from.
#[derive(Clone, Debug)]
pub struct OutputData {
    /// Primary joint velocity command.
    ///
    /// Units: radians/second
    pub q1_rads: VelocityCommand,

    /// Task error vector (translation, then theta-u if enabled).
    pub error: DVector<f64>,

    /// Euclidean norm of the task error.
    pub err_norm: f64,

    /// Adaptive gain evaluated at the current error norm.
    pub lambda: f64,

    /// Task Jacobian.
    pub task_jac: DMatrix<f64>,

    /// Moore-Penrose pseudo-inverse of the task Jacobian.
    pub task_jac_pinv: DMatrix<f64>,

    /// Condition number of the task Jacobian (largest over smallest
    /// singular value).
    pub cond: f64,
}

/// Status report for VisualServo processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// True if a target pose estimate was available this cycle.
    pub target_tracked: bool,

    /// True if the task Jacobian lost rank and the minimum-norm solution
    /// was used.
    pub degenerate_jacobian: bool,

    pub err_norm: f64,
    pub lambda: f64,
    pub cond: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for VisualServo {
    fn default() -> Self {
        Self {
            params: Params::default(),
            gain: AdaptiveGain::default(),
            target_twist: DMatrix::zeros(0, 0),
            num_joints: 0,
            report: StatusReport::default(),
            arch_report: Archiver::default(),
        }
    }
}

impl State for VisualServo {
    type InitData = VisualServoInit;
    type InitError = VisualServoError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = VisualServoError;

    /// Initialise the VisualServo module.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        // Load the parameters
        let params: Params = params::load(init_data.params_path)
            .map_err(VisualServoError::ParamLoadError)?;

        *self = Self::with_params(params, &init_data.target_m_ee, init_data.num_joints)?;

        // Create the arch folder for visual_servo
        let mut arch_path = session.arch_root.clone();
        arch_path.push("visual_servo");
        std::fs::create_dir_all(arch_path).unwrap();

        self.arch_report = Archiver::from_path(
            session, "visual_servo/status_report.csv"
        ).unwrap();

        Ok(())
    }

    /// Perform cyclic processing of Visual servoing control.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        // Clear the status report
        self.report = StatusReport::default();

        let task_dim = self.task_dim();

        // With no tracked target the primary command is a full stop
        let c_m_o = match input_data.target_pose {
            Some(p) => p,
            None => {
                return Ok((
                    OutputData::full_stop(task_dim, self.num_joints),
                    self.report,
                ));
            }
        };

        self.report.target_tracked = true;

        // The sensed Jacobian must match the controlled joint set
        if input_data.ee_jac.nrows() != FULL_TASK_DIM
            || input_data.ee_jac.ncols() != self.num_joints
        {
            return Err(VisualServoError::JacobianDimMismatch {
                rows: input_data.ee_jac.nrows(),
                cols: input_data.ee_jac.ncols(),
                exp_rows: FULL_TASK_DIM,
                exp_cols: self.num_joints,
            });
        }

        // Relative transform between the desired and current target frames
        let cd_m_c = input_data.desired_pose.inverse() * c_m_o;
        trace!("cdMc: {}", PoseVec::from_pose(&cd_m_c));

        // Task error: translation plus theta-u rotation
        let t = cd_m_c.translation.vector;
        let tu = cd_m_c.rotation.scaled_axis();

        let mut error = DVector::zeros(task_dim);
        for i in 0..3 {
            error[i] = t[i];
        }
        if task_dim == FULL_TASK_DIM {
            for i in 0..3 {
                error[i + 3] = tu[i];
            }
        }

        let err_norm = error.norm();

        // Compose the task Jacobian from the fixed twist and the sensed
        // end-effector Jacobian
        let task_jac_full = &self.target_twist * &input_data.ee_jac;
        let task_jac = if self.params.translation_only {
            task_jac_full.rows(0, TRANS_TASK_DIM).into_owned()
        }
        else {
            task_jac_full
        };

        // Pseudo-inverse by SVD. Rank deficiency is flagged but not an
        // error, the pseudo-inverse falls back to the minimum-norm solution.
        let svd = task_jac.clone().svd(true, true);
        let sing_vals = svd.singular_values.clone();

        let sv_max = sing_vals.iter().cloned().fold(0.0, f64::max);
        let sv_min = sing_vals.iter().cloned().fold(f64::INFINITY, f64::min);

        if sv_min < self.params.sv_tolerance {
            self.report.degenerate_jacobian = true;
        }

        let cond = sv_max / sv_min.max(self.params.sv_tolerance);

        let task_jac_pinv = svd
            .pseudo_inverse(self.params.sv_tolerance)
            .map_err(VisualServoError::PseudoInverseFailed)?;

        // Primary command
        let lambda = self.gain.value(err_norm);
        let q1_rads: VelocityCommand = -(&task_jac_pinv * &error) * lambda;

        trace!(
            "VisualServo: |e| = {:.6}, lambda = {:.4}, cond = {:.2}",
            err_norm, lambda, cond
        );

        self.report.err_norm = err_norm;
        self.report.lambda = lambda;
        self.report.cond = cond;

        let output = OutputData {
            q1_rads,
            error,
            err_norm,
            lambda,
            task_jac,
            task_jac_pinv,
            cond,
        };

        Ok((output, self.report))
    }
}

impl Archived for VisualServo {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.arch_report.serialise(self.report)
    }
}

impl VisualServo {
    /// Build a module instance directly from parameters, without touching
    /// the filesystem. Used by `init` and by the tests.
    pub fn with_params(
        params: Params,
        target_m_ee: &Pose,
        num_joints: usize,
    ) -> Result<Self, VisualServoError> {
        let gain = AdaptiveGain::new(params.gain_zero, params.gain_inf, params.gain_slope)?;

        Ok(Self {
            gain,
            target_twist: vel_twist(target_m_ee),
            num_joints,
            params,
            report: StatusReport::default(),
            arch_report: Archiver::default(),
        })
    }

    /// The dimension of the task space.
    pub fn task_dim(&self) -> usize {
        if self.params.translation_only {
            TRANS_TASK_DIM
        }
        else {
            FULL_TASK_DIM
        }
    }
}

impl OutputData {
    /// A full-stop output: zero command, zero error, zero snapshots.
    pub fn full_stop(task_dim: usize, num_joints: usize) -> Self {
        Self {
            q1_rads: DVector::zeros(num_joints),
            error: DVector::zeros(task_dim),
            err_norm: 0.0,
            lambda: 0.0,
            task_jac: DMatrix::zeros(task_dim, num_joints),
            task_jac_pinv: DMatrix::zeros(num_joints, task_dim),
            cond: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    fn test_params() -> Params {
        Params {
            gain_zero: 0.8,
            gain_inf: 0.06,
            gain_slope: 8.0,
            translation_only: false,
            sv_tolerance: 1e-6,
        }
    }

    /// Identity-shaped 6 x n end-effector Jacobian.
    fn eye_jac(num_joints: usize) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(6, num_joints);
        for i in 0..6 {
            jac[(i, i)] = 1.0;
        }
        jac
    }

    #[test]
    fn test_zero_error_at_target() {
        let mut vs =
            VisualServo::with_params(test_params(), &Pose::identity(), 7).unwrap();

        let pose = Pose::from_parts(
            Translation3::new(0.2, -0.1, 0.4),
            UnitQuaternion::from_euler_angles(0.1, 0.0, 0.3),
        );

        let (out, rpt) = vs
            .proc(&InputData {
                target_pose: Some(pose),
                desired_pose: pose,
                ee_jac: eye_jac(7),
            })
            .unwrap();

        assert!(rpt.target_tracked);
        assert!(out.err_norm < 1e-10);
        assert!(out.q1_rads.norm() < 1e-10);

        // Gain is at its zero-error value
        assert!((out.lambda - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_translation_error_command() {
        // Pure x-translation error of 0.1 m on an identity-shaped Jacobian:
        // the command's x-component opposes the error with magnitude
        // lambda * 0.1
        let mut vs =
            VisualServo::with_params(test_params(), &Pose::identity(), 7).unwrap();

        let current = Pose::from_parts(
            Translation3::new(0.1, 0.0, 0.0),
            UnitQuaternion::identity(),
        );

        let (out, _) = vs
            .proc(&InputData {
                target_pose: Some(current),
                desired_pose: Pose::identity(),
                ee_jac: eye_jac(7),
            })
            .unwrap();

        assert!((out.err_norm - 0.1).abs() < 1e-12);
        assert!(out.q1_rads[0] < 0.0);
        assert!((out.q1_rads[0] + out.lambda * 0.1).abs() < 1e-9);

        // No command on the other joints
        for i in 1..7 {
            assert!(out.q1_rads[i].abs() < 1e-9);
        }
    }

    #[test]
    fn test_full_stop_when_target_lost() {
        let mut vs =
            VisualServo::with_params(test_params(), &Pose::identity(), 7).unwrap();

        let (out, rpt) = vs
            .proc(&InputData {
                target_pose: None,
                desired_pose: Pose::identity(),
                ee_jac: eye_jac(7),
            })
            .unwrap();

        assert!(!rpt.target_tracked);
        assert_eq!(out.q1_rads.norm(), 0.0);
        assert_eq!(out.q1_rads.len(), 7);
    }

    #[test]
    fn test_degenerate_jacobian_flagged() {
        let mut vs =
            VisualServo::with_params(test_params(), &Pose::identity(), 7).unwrap();

        // Zero the last row so the Jacobian loses rank
        let mut jac = eye_jac(7);
        jac[(5, 5)] = 0.0;

        let current = Pose::from_parts(
            Translation3::new(0.1, 0.0, 0.0),
            UnitQuaternion::identity(),
        );

        let (out, rpt) = vs
            .proc(&InputData {
                target_pose: Some(current),
                desired_pose: Pose::identity(),
                ee_jac: jac,
            })
            .unwrap();

        assert!(rpt.degenerate_jacobian);

        // The minimum-norm command is still finite
        assert!(out.q1_rads.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_jacobian_dim_mismatch() {
        let mut vs =
            VisualServo::with_params(test_params(), &Pose::identity(), 7).unwrap();

        let result = vs.proc(&InputData {
            target_pose: Some(Pose::identity()),
            desired_pose: Pose::identity(),
            ee_jac: eye_jac(6),
        });

        assert!(matches!(
            result,
            Err(VisualServoError::JacobianDimMismatch { .. })
        ));
    }

    #[test]
    fn test_translation_only_mode() {
        let mut params = test_params();
        params.translation_only = true;

        let mut vs = VisualServo::with_params(params, &Pose::identity(), 7).unwrap();

        let current = Pose::from_parts(
            Translation3::new(0.0, 0.05, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5),
        );

        let (out, _) = vs
            .proc(&InputData {
                target_pose: Some(current),
                desired_pose: Pose::identity(),
                ee_jac: eye_jac(7),
            })
            .unwrap();

        // Rotation is ignored, only the 3 translation components remain
        assert_eq!(out.error.len(), 3);
        assert_eq!(out.task_jac.nrows(), 3);
        assert!((out.err_norm - 0.05).abs() < 1e-12);
    }
}
