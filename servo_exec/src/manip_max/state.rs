//! Implementations for the ManipMax state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

// Internal
use super::{ManipMaxError, Params};
use robot_if::eqpt::arm::VelocityCommand;
use util::{
    archive::{Archived, Archiver},
    module::State,
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Manipulability maximisation module state
#[derive(Default)]
pub struct ManipMax {
    pub(crate) params: Params,

    num_joints: usize,

    pub(crate) report: StatusReport,
    arch_report: Archiver,
}

/// Data required to initialise ManipMax.
pub struct ManipMaxInit {
    /// Path to the parameter file, relative to the params directory.
    pub params_path: &'static str,

    /// Number of controlled joints.
    pub num_joints: usize,
}

/// Input data to Manipulability maximisation.
pub struct InputData {
    /// Nullspace projector of the task Jacobian, computed by the redundancy
    /// resolver from the primary controller's snapshots.
    pub projector: DMatrix<f64>,

    /// Base-frame arm Jacobian used for the manipulability measure.
    pub jacobian: DMatrix<f64>,

    /// Derivative of the Jacobian with respect to each joint, evaluated at
    /// the current configuration.
    pub derivatives: Vec<DMatrix<f64>>,
}

/// Output correction from ManipMax.
#[derive(Clone, Debug)]
pub struct OutputData {
    /// Raw gradient-ascent direction in joint space.
    ///
    /// Units: radians/second
    pub z_rads: VelocityCommand,

    /// The gradient projected into the task nullspace. Guaranteed to
    /// produce zero task-space velocity to first order.
    ///
    /// Units: radians/second
    pub q_manip_rads: VelocityCommand,
}

/// Status report for ManipMax processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// Current manipulability measure `sqrt(det(J * J^T))`.
    pub manipulability: f64,

    /// True if `det(J * J^T)` came out negative from floating point error
    /// near a singularity and was floored to zero.
    pub det_floored: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for ManipMax {
    type InitData = ManipMaxInit;
    type InitError = ManipMaxError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = ManipMaxError;

    /// Initialise the ManipMax module.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        // Load the parameters
        self.params = params::load(init_data.params_path)
            .map_err(ManipMaxError::ParamLoadError)?;

        self.num_joints = init_data.num_joints;

        // Create the arch folder for manip_max
        let mut arch_path = session.arch_root.clone();
        arch_path.push("manip_max");
        std::fs::create_dir_all(arch_path).unwrap();

        self.arch_report = Archiver::from_path(
            session, "manip_max/status_report.csv"
        ).unwrap();

        Ok(())
    }

    /// Perform cyclic processing of Manipulability maximisation.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        // Clear the status report
        self.report = StatusReport::default();

        let num_joints = self.num_joints;

        // The derivative set and projector must match the controlled joint
        // set exactly, a mismatch is an integration error
        if input_data.derivatives.len() != num_joints {
            return Err(ManipMaxError::DerivativeCountMismatch {
                expected: num_joints,
                got: input_data.derivatives.len(),
            });
        }

        if input_data.projector.nrows() != num_joints
            || input_data.projector.ncols() != num_joints
        {
            return Err(ManipMaxError::ProjectorDimMismatch {
                rows: input_data.projector.nrows(),
                cols: input_data.projector.ncols(),
                num_joints,
            });
        }

        let jac = &input_data.jacobian;

        for (index, d_jac) in input_data.derivatives.iter().enumerate() {
            if d_jac.nrows() != jac.nrows() || d_jac.ncols() != jac.ncols() {
                return Err(ManipMaxError::DerivativeShapeMismatch {
                    index,
                    rows: d_jac.nrows(),
                    cols: d_jac.ncols(),
                    exp_rows: jac.nrows(),
                    exp_cols: jac.ncols(),
                });
            }
        }

        // Manipulability measure. Near a singularity the determinant can
        // come out as a small negative number, floor it before the root.
        let mut det = (jac * jac.transpose()).determinant();
        if det < 0.0 {
            det = 0.0;
            self.report.det_floored = true;
        }
        let manipulability = det.sqrt();
        self.report.manipulability = manipulability;

        let jac_pinv = jac
            .clone()
            .svd(true, true)
            .pseudo_inverse(self.params.sv_tolerance)
            .map_err(ManipMaxError::PseudoInverseFailed)?;

        // Gradient of the manipulability measure with respect to each joint
        let mut z_rads: VelocityCommand = DVector::zeros(num_joints);
        for i in 0..num_joints {
            let grad = (&input_data.derivatives[i] * &jac_pinv).trace();
            z_rads[i] = self.params.alpha * manipulability * grad;
        }

        let q_manip_rads = &input_data.projector * &z_rads;

        trace!(
            "ManipMax: w = {:.6}, |z| = {:.6}",
            manipulability,
            z_rads.norm()
        );

        Ok((
            OutputData {
                z_rads,
                q_manip_rads,
            },
            self.report,
        ))
    }
}

impl Archived for ManipMax {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.arch_report.serialise(self.report)
    }
}

impl ManipMax {
    /// Build a module instance directly from parameters, without touching
    /// the filesystem. Used by the tests.
    pub fn with_params(params: Params, num_joints: usize) -> Self {
        Self {
            params,
            num_joints,
            report: StatusReport::default(),
            arch_report: Archiver::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const NUM_JOINTS: usize = 7;

    fn test_params() -> Params {
        Params {
            alpha: 0.9,
            sv_tolerance: 1e-6,
        }
    }

    /// Identity-shaped 6 x n Jacobian.
    fn eye_jac() -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(6, NUM_JOINTS);
        for i in 0..6 {
            jac[(i, i)] = 1.0;
        }
        jac
    }

    fn identity_projector() -> DMatrix<f64> {
        DMatrix::identity(NUM_JOINTS, NUM_JOINTS)
    }

    #[test]
    fn test_constant_jacobian_gives_zero() {
        // All derivatives zero: the manipulability gradient vanishes
        let mut mm = ManipMax::with_params(test_params(), NUM_JOINTS);

        let (out, rpt) = mm
            .proc(&InputData {
                projector: identity_projector(),
                jacobian: eye_jac(),
                derivatives: vec![DMatrix::zeros(6, NUM_JOINTS); NUM_JOINTS],
            })
            .unwrap();

        assert_eq!(out.z_rads.norm(), 0.0);
        assert_eq!(out.q_manip_rads.norm(), 0.0);

        // det(J * J^T) = 1 for the identity-shaped Jacobian
        assert!((rpt.manipulability - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_known_gradient_value() {
        // For J = [I6 | 0] the pseudo-inverse is [I6 ; 0], so a derivative
        // with a single 1 at (0, 0) has trace(dJ * J^+) = 1 and
        // z_0 = alpha * sqrt(det(J J^T)) * 1 = 0.9
        let mut mm = ManipMax::with_params(test_params(), NUM_JOINTS);

        let mut derivatives = vec![DMatrix::zeros(6, NUM_JOINTS); NUM_JOINTS];
        derivatives[0][(0, 0)] = 1.0;

        let (out, _) = mm
            .proc(&InputData {
                projector: identity_projector(),
                jacobian: eye_jac(),
                derivatives,
            })
            .unwrap();

        assert!((out.z_rads[0] - 0.9).abs() < 1e-9);
        for i in 1..NUM_JOINTS {
            assert!(out.z_rads[i].abs() < 1e-12);
        }
    }

    #[test]
    fn test_projection_into_nullspace() {
        // With a projector that zeroes everything except joint 6, only that
        // component of the gradient survives
        let mut mm = ManipMax::with_params(test_params(), NUM_JOINTS);

        let mut projector = DMatrix::zeros(NUM_JOINTS, NUM_JOINTS);
        projector[(6, 6)] = 1.0;

        let mut derivatives = vec![DMatrix::zeros(6, NUM_JOINTS); NUM_JOINTS];
        derivatives[0][(0, 0)] = 1.0;
        derivatives[6][(1, 1)] = 1.0;

        let (out, _) = mm
            .proc(&InputData {
                projector,
                jacobian: eye_jac(),
                derivatives,
            })
            .unwrap();

        assert!(out.z_rads[0] > 0.0);
        assert_eq!(out.q_manip_rads[0], 0.0);
        assert!(out.q_manip_rads[6] > 0.0);
    }

    #[test]
    fn test_singular_jacobian_gives_zero_gradient() {
        // A rank-deficient Jacobian has zero manipulability, so the
        // gradient term vanishes regardless of the derivatives
        let mut mm = ManipMax::with_params(test_params(), NUM_JOINTS);

        let mut jac = eye_jac();
        jac[(5, 5)] = 0.0;

        let mut derivatives = vec![DMatrix::zeros(6, NUM_JOINTS); NUM_JOINTS];
        derivatives[2][(0, 0)] = 1.0;

        let (out, rpt) = mm
            .proc(&InputData {
                projector: identity_projector(),
                jacobian: jac,
                derivatives,
            })
            .unwrap();

        assert!(rpt.manipulability.abs() < 1e-9);
        assert!(out.z_rads.norm() < 1e-9);
    }

    #[test]
    fn test_derivative_count_mismatch() {
        let mut mm = ManipMax::with_params(test_params(), NUM_JOINTS);

        let result = mm.proc(&InputData {
            projector: identity_projector(),
            jacobian: eye_jac(),
            derivatives: vec![DMatrix::zeros(6, NUM_JOINTS); 3],
        });

        assert!(matches!(
            result,
            Err(ManipMaxError::DerivativeCountMismatch {
                expected: NUM_JOINTS,
                got: 3
            })
        ));
    }

    #[test]
    fn test_derivative_shape_mismatch() {
        let mut mm = ManipMax::with_params(test_params(), NUM_JOINTS);

        let mut derivatives = vec![DMatrix::zeros(6, NUM_JOINTS); NUM_JOINTS];
        derivatives[4] = DMatrix::zeros(3, NUM_JOINTS);

        let result = mm.proc(&InputData {
            projector: identity_projector(),
            jacobian: eye_jac(),
            derivatives,
        });

        assert!(matches!(
            result,
            Err(ManipMaxError::DerivativeShapeMismatch { index: 4, .. })
        ));
    }
}
