//! Implementations for the LimitAvoid state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::DVector;
use serde::Serialize;

// Internal
use super::{LimitAvoidError, Params};
use robot_if::eqpt::arm::{JointConfig, JointLimits, VelocityCommand};
use util::{
    archive::{Archived, Archiver},
    maths::cos_blend,
    module::State,
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Joint limit avoidance module state
pub struct LimitAvoid {
    pub(crate) params: Params,

    limits: JointLimits,

    /// Per-joint activation boundaries, fixed once the limits are known.
    bands: Bands,

    pub(crate) report: StatusReport,
    arch_report: Archiver,
}

/// Data required to initialise LimitAvoid.
pub struct LimitAvoidInit {
    /// Path to the parameter file, relative to the params directory.
    pub params_path: &'static str,

    /// Mechanical limits of the controlled joints.
    pub limits: JointLimits,
}

/// Per-joint activation boundaries.
#[derive(Debug, Clone)]
pub struct Bands {
    /// Inner boundary near the lower limit (`min + rho * range`).
    pub lower_inner_rad: DVector<f64>,

    /// Outer boundary near the lower limit, a further `rho * rho1 * range`
    /// toward the limit.
    pub lower_outer_rad: DVector<f64>,

    /// Inner boundary near the upper limit (`max - rho * range`).
    pub upper_inner_rad: DVector<f64>,

    /// Outer boundary near the upper limit.
    pub upper_outer_rad: DVector<f64>,
}

/// Input data to Joint limit avoidance.
pub struct InputData {
    /// Current joint configuration.
    pub config_rad: JointConfig,

    /// Primary joint velocity command this cycle.
    pub q1_rads: VelocityCommand,
}

/// Output correction from LimitAvoid.
#[derive(Clone, Debug)]
pub struct OutputData {
    /// Raw repulsive correction. Must be nullspace-projected by the
    /// redundancy resolver before being summed with the primary command.
    ///
    /// Units: radians/second
    pub q2_rads: VelocityCommand,

    /// Activation boundaries, republished for telemetry.
    pub bands: Bands,
}

/// Status report for LimitAvoid processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// Number of joints inside their activation band this cycle.
    pub num_active: usize,

    /// Number of joints past the outer boundary, with the correction
    /// saturated.
    pub num_saturated: usize,

    /// Number of active joints whose primary command is currently pushing
    /// them further toward the limit.
    pub num_opposed: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Bands {
    fn default() -> Self {
        Self {
            lower_inner_rad: DVector::zeros(0),
            lower_outer_rad: DVector::zeros(0),
            upper_inner_rad: DVector::zeros(0),
            upper_outer_rad: DVector::zeros(0),
        }
    }
}

impl Default for LimitAvoid {
    fn default() -> Self {
        Self {
            params: Params::default(),
            limits: JointLimits {
                min_rad: DVector::zeros(0),
                max_rad: DVector::zeros(0),
            },
            bands: Bands::default(),
            report: StatusReport::default(),
            arch_report: Archiver::default(),
        }
    }
}

impl State for LimitAvoid {
    type InitData = LimitAvoidInit;
    type InitError = LimitAvoidError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = LimitAvoidError;

    /// Initialise the LimitAvoid module.
    ///
    /// Validates the activation widths and the joint limits, then
    /// precomputes the per-joint activation boundaries.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        // Load the parameters
        let params: Params = params::load(init_data.params_path)
            .map_err(LimitAvoidError::ParamLoadError)?;

        *self = Self::with_params(params, init_data.limits)?;

        // Create the arch folder for limit_avoid
        let mut arch_path = session.arch_root.clone();
        arch_path.push("limit_avoid");
        std::fs::create_dir_all(arch_path).unwrap();

        self.arch_report = Archiver::from_path(
            session, "limit_avoid/status_report.csv"
        ).unwrap();

        Ok(())
    }

    /// Perform cyclic processing of Joint limit avoidance.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        // Clear the status report
        self.report = StatusReport::default();

        let num_joints = self.limits.num_joints();

        if input_data.config_rad.len() != num_joints {
            return Err(LimitAvoidError::ConfigDimMismatch {
                got: input_data.config_rad.len(),
                expected: num_joints,
            });
        }

        let mut q2_rads: VelocityCommand = DVector::zeros(num_joints);

        for i in 0..num_joints {
            let q = input_data.config_rad[i];

            // Signed fraction through the transition band: 0 at the inner
            // boundary, 1 at the outer, above 1 past it.
            let (fraction, away_sign) = if q < self.bands.lower_inner_rad[i] {
                let width = self.bands.lower_inner_rad[i] - self.bands.lower_outer_rad[i];
                ((self.bands.lower_inner_rad[i] - q) / width, 1.0)
            }
            else if q > self.bands.upper_inner_rad[i] {
                let width = self.bands.upper_outer_rad[i] - self.bands.upper_inner_rad[i];
                ((q - self.bands.upper_inner_rad[i]) / width, -1.0)
            }
            else {
                continue;
            };

            self.report.num_active += 1;
            if fraction >= 1.0 {
                self.report.num_saturated += 1;
            }
            if input_data.q1_rads[i] * away_sign < 0.0 {
                self.report.num_opposed += 1;
            }

            // Half-cosine ramp from zero at the inner boundary to the
            // saturation magnitude at the outer boundary, clamped beyond
            q2_rads[i] = away_sign * self.params.max_rate_rads * cos_blend(fraction);
        }

        if self.report.num_active > 0 {
            trace!(
                "LimitAvoid: {} joint(s) in band, {} saturated",
                self.report.num_active, self.report.num_saturated
            );
        }

        let output = OutputData {
            q2_rads,
            bands: self.bands.clone(),
        };

        Ok((output, self.report))
    }
}

impl Archived for LimitAvoid {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.arch_report.serialise(self.report)
    }
}

impl LimitAvoid {
    /// Build a module instance directly from parameters and limits, without
    /// touching the filesystem. Used by `init` and by the tests.
    pub fn with_params(params: Params, limits: JointLimits) -> Result<Self, LimitAvoidError> {
        // Validate activation widths
        if !(params.rho > 0.0 && params.rho < 1.0) {
            return Err(LimitAvoidError::InvalidActivationWidth {
                name: "rho",
                value: params.rho,
            });
        }
        if !(params.rho1 > 0.0 && params.rho1 < 1.0) {
            return Err(LimitAvoidError::InvalidActivationWidth {
                name: "rho1",
                value: params.rho1,
            });
        }

        // Validate limits
        if let Some(&joint) = limits.invalid_joints().first() {
            return Err(LimitAvoidError::InvalidJointLimits {
                joint,
                min_rad: limits.min_rad[joint],
                max_rad: limits.max_rad[joint],
            });
        }

        let bands = Bands::compute(&limits, &params);

        Ok(Self {
            params,
            limits,
            bands,
            report: StatusReport::default(),
            arch_report: Archiver::default(),
        })
    }
}

impl Bands {
    /// Compute the activation boundaries for the given limits and widths.
    fn compute(limits: &JointLimits, params: &Params) -> Self {
        let range = limits.range_rad();

        let lower_inner_rad = &limits.min_rad + &range * params.rho;
        let upper_inner_rad = &limits.max_rad - &range * params.rho;

        let lower_outer_rad = &lower_inner_rad - &range * (params.rho * params.rho1);
        let upper_outer_rad = &upper_inner_rad + &range * (params.rho * params.rho1);

        Self {
            lower_inner_rad,
            lower_outer_rad,
            upper_inner_rad,
            upper_outer_rad,
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
            rho: 0.2,
            rho1: 0.4,
            max_rate_rads: 0.3,
        }
    }

    fn test_limits() -> JointLimits {
        JointLimits {
            min_rad: DVector::from_element(NUM_JOINTS, -2.0),
            max_rad: DVector::from_element(NUM_JOINTS, 2.0),
        }
    }

    fn proc_at(config: JointConfig) -> (OutputData, StatusReport) {
        let mut la = LimitAvoid::with_params(test_params(), test_limits()).unwrap();
        let q1 = DVector::zeros(config.len());
        la.proc(&InputData {
            config_rad: config,
            q1_rads: q1,
        })
        .unwrap()
    }

    #[test]
    fn test_zero_inside_inner_band() {
        // All joints centred: no correction at all
        let (out, rpt) = proc_at(DVector::zeros(NUM_JOINTS));

        assert_eq!(out.q2_rads.norm(), 0.0);
        assert_eq!(rpt.num_active, 0);
    }

    #[test]
    fn test_pinned_at_upper_limit() {
        // Joint 1 exactly at its upper limit: correction points toward the
        // lower limit at the saturation magnitude, all other joints zero
        let mut config = DVector::zeros(NUM_JOINTS);
        config[1] = 2.0;

        let (out, rpt) = proc_at(config);

        assert!((out.q2_rads[1] + 0.3).abs() < 1e-12);
        for i in 0..NUM_JOINTS {
            if i != 1 {
                assert_eq!(out.q2_rads[i], 0.0);
            }
        }
        assert_eq!(rpt.num_active, 1);
        assert_eq!(rpt.num_saturated, 1);
    }

    #[test]
    fn test_direction_away_from_lower_limit() {
        // range = 4, inner lower boundary at -2 + 0.8 = -1.2, outer at
        // -1.2 - 0.32 = -1.52. A joint at -1.4 is inside the band.
        let mut config = DVector::zeros(NUM_JOINTS);
        config[3] = -1.4;

        let (out, rpt) = proc_at(config);

        assert!(out.q2_rads[3] > 0.0);
        assert!(out.q2_rads[3] < 0.3);
        assert_eq!(rpt.num_active, 1);
        assert_eq!(rpt.num_saturated, 0);
    }

    #[test]
    fn test_saturates_beyond_outer_boundary() {
        // Between the outer boundary (-1.52) and the limit the correction
        // holds at the saturation magnitude
        let mut config = DVector::zeros(NUM_JOINTS);
        config[0] = -1.9;

        let (out, rpt) = proc_at(config);

        assert!((out.q2_rads[0] - 0.3).abs() < 1e-12);
        assert_eq!(rpt.num_saturated, 1);
    }

    #[test]
    fn test_monotone_in_band() {
        // Correction magnitude grows monotonically with proximity to the
        // limit across the transition band
        let mut prev = 0.0;
        for i in 0..=20 {
            let q = -1.2 - 0.32 * (i as f64 / 20.0);
            let mut config = DVector::zeros(NUM_JOINTS);
            config[0] = q;

            let (out, _) = proc_at(config);
            assert!(out.q2_rads[0] >= prev);
            prev = out.q2_rads[0];
        }

        // Full magnitude at the outer boundary
        assert!((prev - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_opposing_primary_command_flagged() {
        let mut la = LimitAvoid::with_params(test_params(), test_limits()).unwrap();

        let mut config = DVector::zeros(NUM_JOINTS);
        config[2] = 1.5;

        // Primary command drives joint 2 further toward the upper limit
        let mut q1 = DVector::zeros(NUM_JOINTS);
        q1[2] = 0.2;

        let (_, rpt) = la
            .proc(&InputData {
                config_rad: config,
                q1_rads: q1,
            })
            .unwrap();

        assert_eq!(rpt.num_opposed, 1);
    }

    #[test]
    fn test_invalid_activation_widths_rejected() {
        let mut params = test_params();
        params.rho = 0.0;
        assert!(matches!(
            LimitAvoid::with_params(params, test_limits()),
            Err(LimitAvoidError::InvalidActivationWidth { name: "rho", .. })
        ));

        let mut params = test_params();
        params.rho1 = 1.0;
        assert!(matches!(
            LimitAvoid::with_params(params, test_limits()),
            Err(LimitAvoidError::InvalidActivationWidth { name: "rho1", .. })
        ));
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let mut limits = test_limits();
        limits.max_rad[4] = limits.min_rad[4];

        assert!(matches!(
            LimitAvoid::with_params(test_params(), limits),
            Err(LimitAvoidError::InvalidJointLimits { joint: 4, .. })
        ));
    }

    #[test]
    fn test_config_dim_mismatch() {
        let mut la = LimitAvoid::with_params(test_params(), test_limits()).unwrap();

        let result = la.proc(&InputData {
            config_rad: DVector::zeros(5),
            q1_rads: DVector::zeros(5),
        });

        assert!(matches!(
            result,
            Err(LimitAvoidError::ConfigDimMismatch { got: 5, expected: 7 })
        ));
    }
}
