//! Implementations for the Redundancy state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

// Internal
use super::{Params, RedundancyError};
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

/// Redundancy resolution module state
#[derive(Default)]
pub struct Redundancy {
    pub(crate) params: Params,

    num_joints: usize,

    /// Session state machine position.
    state: ServoState,

    /// Number of consecutive cycles with the error norm below the
    /// convergence threshold.
    consec_converged: u64,

    /// Time at which servoing was engaged, set on the Tracking -> Servoing
    /// transition.
    servo_start_s: Option<f64>,

    pub(crate) report: StatusReport,
    arch_report: Archiver,
}

/// Data required to initialise Redundancy.
pub struct RedundancyInit {
    /// Path to the parameter file, relative to the params directory.
    pub params_path: &'static str,

    /// Number of controlled joints.
    pub num_joints: usize,
}

/// Input data to Redundancy resolution.
pub struct InputData {
    /// Session elapsed time this cycle.
    ///
    /// Units: seconds
    pub time_s: f64,

    /// True if a cooperative stop has been requested. The resolver emits a
    /// zero command and enters the terminal `Stopped` state.
    pub stop_requested: bool,

    /// True if the tracker produced a pose estimate this cycle.
    pub target_tracked: bool,

    /// True if any upstream component failed this cycle. The resolver
    /// substitutes a zero command rather than dispatching stale data.
    pub component_failure: bool,

    /// Primary command from the visual servoing controller.
    pub q1_rads: Option<VelocityCommand>,

    /// Task error norm this cycle.
    pub err_norm: f64,

    /// Nullspace projector of the task Jacobian.
    pub projector: Option<DMatrix<f64>>,

    /// Raw joint limit avoidance correction.
    pub q2_rads: Option<VelocityCommand>,

    /// Projected manipulability correction.
    pub q_manip_rads: Option<VelocityCommand>,
}

/// Output command from Redundancy that the arm must execute.
#[derive(Clone, Debug)]
pub struct OutputData {
    /// The combined joint velocity command to dispatch.
    ///
    /// Units: radians/second
    pub dems_rads: VelocityCommand,

    /// The projected weighted secondary contribution, for telemetry.
    ///
    /// Units: radians/second
    pub q_sec_rads: VelocityCommand,
}

/// Status report for Redundancy processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// State machine position after this cycle.
    pub state: ServoState,

    /// True on the cycle the convergence predicate was met.
    pub converged: bool,

    /// True on the cycle tracking was lost during servoing.
    pub tracking_lost: bool,

    /// True if a zero command was substituted for a failed component.
    pub substituted_zero: bool,

    pub err_norm: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Session states of the servoing loop.
///
/// `Stopped` is terminal: it is entered on convergence, on an explicit stop
/// request or on a fatal error. Loss of tracking during servoing is not
/// terminal, the machine returns to `Tracking` and re-engages on the next
/// successful pose estimate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum ServoState {
    /// No cycle processed yet.
    Uninit,

    /// Waiting for a target pose estimate, arm commanded to zero velocity.
    Tracking,

    /// Primary task active, secondary tasks projected each cycle.
    Servoing,

    /// Session over, zero velocity only.
    Stopped,
}

impl Default for ServoState {
    fn default() -> Self {
        ServoState::Uninit
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for Redundancy {
    type InitData = RedundancyInit;
    type InitError = RedundancyError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = RedundancyError;

    /// Initialise the Redundancy module.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        // Load the parameters
        let params: Params = params::load(init_data.params_path)
            .map_err(RedundancyError::ParamLoadError)?;

        *self = Self::with_params(params, init_data.num_joints)?;

        // Create the arch folder for redundancy
        let mut arch_path = session.arch_root.clone();
        arch_path.push("redundancy");
        std::fs::create_dir_all(arch_path).unwrap();

        self.arch_report = Archiver::from_path(
            session, "redundancy/status_report.csv"
        ).unwrap();

        Ok(())
    }

    /// Perform cyclic processing of Redundancy resolution.
    ///
    /// Exactly one command is produced per cycle, built fresh from this
    /// cycle's inputs. A previously issued command is never re-dispatched.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        // Clear the status report
        self.report = StatusReport::default();
        self.report.err_norm = input_data.err_norm;

        // An explicit stop request wins over everything else
        let output = if input_data.stop_requested {
            if self.state != ServoState::Stopped {
                info!("Stop requested, servoing session over");
            }
            self.state = ServoState::Stopped;
            self.zero_output()
        }
        else {
            match self.state {
                ServoState::Uninit => {
                    info!("Waiting for first target acquisition");
                    self.state = ServoState::Tracking;
                    self.zero_output()
                }

                ServoState::Tracking => {
                    if input_data.target_tracked
                        && input_data.q1_rads.is_some()
                        && !input_data.component_failure
                    {
                        // Entry action for the Tracking -> Servoing
                        // transition
                        self.servo_start_s = Some(input_data.time_s);
                        self.consec_converged = 0;
                        self.state = ServoState::Servoing;

                        info!(
                            "Target acquired, visual servoing engaged (t = {:.3} s)",
                            input_data.time_s
                        );

                        self.combine(input_data)?
                    }
                    else {
                        self.zero_output()
                    }
                }

                ServoState::Servoing => {
                    if !input_data.target_tracked {
                        warn!("Target lost, stopping arm and returning to tracking");
                        self.report.tracking_lost = true;
                        self.state = ServoState::Tracking;
                        self.zero_output()
                    }
                    else if input_data.component_failure || input_data.q1_rads.is_none() {
                        self.report.substituted_zero = true;
                        self.zero_output()
                    }
                    else {
                        // Convergence accounting
                        if input_data.err_norm < self.params.converge_err_norm {
                            self.consec_converged += 1;
                        }
                        else {
                            self.consec_converged = 0;
                        }

                        if self.consec_converged >= self.params.converge_cycles {
                            info!(
                                "Converged: |e| = {:.6} for {} consecutive cycles",
                                input_data.err_norm, self.consec_converged
                            );
                            self.report.converged = true;
                            self.state = ServoState::Stopped;
                            self.zero_output()
                        }
                        else {
                            self.combine(input_data)?
                        }
                    }
                }

                ServoState::Stopped => self.zero_output(),
            }
        };

        self.report.state = self.state;

        Ok((output, self.report))
    }
}

impl Archived for Redundancy {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.arch_report.serialise(self.report)
    }
}

impl Redundancy {
    /// Build a module instance directly from parameters, without touching
    /// the filesystem. Used by `init` and by the tests.
    pub fn with_params(params: Params, num_joints: usize) -> Result<Self, RedundancyError> {
        if params.converge_err_norm <= 0.0 || params.converge_cycles == 0 {
            return Err(RedundancyError::InvalidConvergence {
                err_norm: params.converge_err_norm,
                cycles: params.converge_cycles,
            });
        }

        Ok(Self {
            params,
            num_joints,
            state: ServoState::Uninit,
            consec_converged: 0,
            servo_start_s: None,
            report: StatusReport::default(),
            arch_report: Archiver::default(),
        })
    }

    /// Current state machine position.
    pub fn state(&self) -> ServoState {
        self.state
    }

    /// Time servoing was engaged, if it has been.
    pub fn servo_start_s(&self) -> Option<f64> {
        self.servo_start_s
    }

    /// A zero velocity output.
    fn zero_output(&self) -> OutputData {
        OutputData {
            dems_rads: DVector::zeros(self.num_joints),
            q_sec_rads: DVector::zeros(self.num_joints),
        }
    }

    /// Combine the primary command with the projected weighted secondary
    /// contributions.
    fn combine(&self, input_data: &InputData) -> Result<OutputData, RedundancyError> {
        // Checked by the caller
        let q1_rads = input_data.q1_rads.as_ref().unwrap();

        if q1_rads.len() != self.num_joints {
            return Err(RedundancyError::PrimaryDimMismatch {
                got: q1_rads.len(),
                expected: self.num_joints,
            });
        }

        let mut q_sec = DVector::zeros(self.num_joints);

        if let Some(q2_rads) = &input_data.q2_rads {
            if q2_rads.len() != self.num_joints {
                return Err(RedundancyError::SecondaryDimMismatch {
                    got: q2_rads.len(),
                    expected: self.num_joints,
                });
            }
            q_sec += q2_rads * self.params.limit_avoid_weight;
        }

        if let Some(q_manip_rads) = &input_data.q_manip_rads {
            if q_manip_rads.len() != self.num_joints {
                return Err(RedundancyError::SecondaryDimMismatch {
                    got: q_manip_rads.len(),
                    expected: self.num_joints,
                });
            }
            q_sec += q_manip_rads * self.params.manip_weight;
        }

        // Project the weighted sum. The manipulability term arrives already
        // projected, the projector is idempotent so this is exact.
        let q_sec_rads = match &input_data.projector {
            Some(projector) => projector * q_sec,
            None => DVector::zeros(self.num_joints),
        };

        Ok(OutputData {
            dems_rads: q1_rads + &q_sec_rads,
            q_sec_rads,
        })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::redundancy::nullspace_projector;

    const NUM_JOINTS: usize = 7;

    fn test_params() -> Params {
        Params {
            limit_avoid_weight: 1.0,
            manip_weight: 1.0,
            converge_err_norm: 0.005,
            converge_cycles: 3,
        }
    }

    /// A full-row-rank 6 x 7 task Jacobian with a coupled redundant column.
    fn task_jac() -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(6, NUM_JOINTS);
        for i in 0..6 {
            jac[(i, i)] = 1.0;
            jac[(i, 6)] = 0.2 * (i as f64 + 1.0);
        }
        jac
    }

    fn pinv(jac: &DMatrix<f64>) -> DMatrix<f64> {
        jac.clone().svd(true, true).pseudo_inverse(1e-12).unwrap()
    }

    /// Input with a tracked target and the given primary command.
    fn servo_input(jac: &DMatrix<f64>, q1: VelocityCommand, err_norm: f64) -> InputData {
        let jac_pinv = pinv(jac);
        InputData {
            time_s: 1.0,
            stop_requested: false,
            target_tracked: true,
            component_failure: false,
            q1_rads: Some(q1),
            err_norm,
            projector: Some(nullspace_projector(jac, &jac_pinv)),
            q2_rads: None,
            q_manip_rads: None,
        }
    }

    #[test]
    fn test_projector_annihilates_task_space() {
        let jac = task_jac();
        let projector = nullspace_projector(&jac, &pinv(&jac));

        // J * P vanishes: projected motion produces no task-space velocity
        let annihilation = &jac * &projector;
        assert!(annihilation.norm() < 1e-9);
    }

    #[test]
    fn test_projector_idempotent() {
        let jac = task_jac();
        let projector = nullspace_projector(&jac, &pinv(&jac));

        let twice = &projector * &projector;
        assert!((twice - &projector).norm() < 1e-9);
    }

    #[test]
    fn test_engages_servoing_on_first_estimate() {
        let mut rd = Redundancy::with_params(test_params(), NUM_JOINTS).unwrap();
        let jac = task_jac();

        // First cycle leaves Uninit with a zero command
        let (out, rpt) = rd
            .proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1))
            .unwrap();
        assert_eq!(rpt.state, ServoState::Tracking);
        assert_eq!(out.dems_rads.norm(), 0.0);

        // Second cycle engages servoing and records the start time
        let (_, rpt) = rd
            .proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1))
            .unwrap();
        assert_eq!(rpt.state, ServoState::Servoing);
        assert_eq!(rd.servo_start_s(), Some(1.0));
    }

    #[test]
    fn test_tracking_loss_emits_zero_and_resumes() {
        let mut rd = Redundancy::with_params(test_params(), NUM_JOINTS).unwrap();
        let jac = task_jac();

        let mut q1 = DVector::zeros(NUM_JOINTS);
        q1[0] = -0.05;

        // Engage servoing
        rd.proc(&servo_input(&jac, q1.clone(), 0.1)).unwrap();
        rd.proc(&servo_input(&jac, q1.clone(), 0.1)).unwrap();
        assert_eq!(rd.state(), ServoState::Servoing);

        // Lose the target: exactly one zero command, back to Tracking
        let mut input = servo_input(&jac, q1.clone(), 0.1);
        input.target_tracked = false;
        input.q1_rads = None;
        input.projector = None;

        let (out, rpt) = rd.proc(&input).unwrap();
        assert!(rpt.tracking_lost);
        assert_eq!(rpt.state, ServoState::Tracking);
        assert_eq!(out.dems_rads.norm(), 0.0);

        // Target reacquired: servoing resumes with a live command
        let (out, rpt) = rd.proc(&servo_input(&jac, q1, 0.1)).unwrap();
        assert_eq!(rpt.state, ServoState::Servoing);
        assert!(out.dems_rads.norm() > 0.0);
    }

    #[test]
    fn test_stop_request_is_terminal() {
        let mut rd = Redundancy::with_params(test_params(), NUM_JOINTS).unwrap();
        let jac = task_jac();

        rd.proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1))
            .unwrap();

        let mut input = servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1);
        input.stop_requested = true;

        let (out, rpt) = rd.proc(&input).unwrap();
        assert_eq!(rpt.state, ServoState::Stopped);
        assert_eq!(out.dems_rads.norm(), 0.0);

        // A fresh estimate does not re-engage a stopped session
        let (out, rpt) = rd
            .proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1))
            .unwrap();
        assert_eq!(rpt.state, ServoState::Stopped);
        assert_eq!(out.dems_rads.norm(), 0.0);
    }

    #[test]
    fn test_convergence_declared_after_consecutive_cycles() {
        let mut rd = Redundancy::with_params(test_params(), NUM_JOINTS).unwrap();
        let jac = task_jac();

        // Leave Uninit, engage servoing
        rd.proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1))
            .unwrap();
        rd.proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1))
            .unwrap();

        // Three consecutive cycles under the threshold converge the servo
        for cycle in 0..3 {
            let (_, rpt) = rd
                .proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.001))
                .unwrap();

            if cycle < 2 {
                assert!(!rpt.converged);
                assert_eq!(rpt.state, ServoState::Servoing);
            }
            else {
                assert!(rpt.converged);
                assert_eq!(rpt.state, ServoState::Stopped);
            }
        }

        // An error excursion resets the count in a fresh session
        let mut rd = Redundancy::with_params(test_params(), NUM_JOINTS).unwrap();
        rd.proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1))
            .unwrap();
        rd.proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1))
            .unwrap();
        rd.proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.001))
            .unwrap();
        rd.proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1))
            .unwrap();
        let (_, rpt) = rd
            .proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.001))
            .unwrap();
        assert!(!rpt.converged);
    }

    #[test]
    fn test_limit_correction_projected_sign_consistent() {
        // Joint 0 is redundant for this task (zero Jacobian column), so a
        // limit correction on joint 0 survives the projection with its sign
        let mut jac = task_jac();
        for i in 0..6 {
            jac[(i, 0)] = 0.0;
        }

        let mut rd = Redundancy::with_params(test_params(), NUM_JOINTS).unwrap();

        // Engage servoing
        rd.proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1))
            .unwrap();
        rd.proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1))
            .unwrap();

        // Joint 0 pinned at its upper limit pushes negative
        let mut q2 = DVector::zeros(NUM_JOINTS);
        q2[0] = -0.3;

        let mut input = servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1);
        input.q2_rads = Some(q2);

        let (out, _) = rd.proc(&input).unwrap();

        assert!(out.dems_rads[0] < 0.0);
        assert!((out.q_sec_rads[0] + 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_secondary_dim_mismatch() {
        let mut rd = Redundancy::with_params(test_params(), NUM_JOINTS).unwrap();
        let jac = task_jac();

        rd.proc(&servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1))
            .unwrap();

        let mut input = servo_input(&jac, DVector::zeros(NUM_JOINTS), 0.1);
        input.q2_rads = Some(DVector::zeros(4));

        assert!(matches!(
            rd.proc(&input),
            Err(RedundancyError::SecondaryDimMismatch { got: 4, expected: NUM_JOINTS })
        ));
    }

    #[test]
    fn test_invalid_convergence_params_rejected() {
        let mut params = test_params();
        params.converge_cycles = 0;
        assert!(matches!(
            Redundancy::with_params(params, NUM_JOINTS),
            Err(RedundancyError::InvalidConvergence { .. })
        ));
    }
}
