//! # Data Store

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{info, warn};

use robot_if::eqpt::arm::JointConfig;
use robot_if::pose::Pose;
use util::archive::Archived;

use crate::{limit_avoid, manip_max, redundancy, visual_servo};

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Gives the reason the executable has been put into safe mode
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SafeModeCause {
    /// The arm equipment stopped responding to sensing or demands.
    ArmNotResponding,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// True if this cycle falls on a 1Hz boundary
    pub is_1_hz_cycle: bool,

    /// Session elapsed time
    pub elapsed_s: f64,

    // Safe mode variables
    /// Determines if the executable is in safe mode. While safe the arm is
    /// commanded to stop instead of receiving velocity demands.
    pub safe: bool,

    /// Gives the reason for being in safe mode.
    pub safe_cause: Option<SafeModeCause>,

    // Per-cycle equipment snapshots
    /// Target pose estimate from the tracker this cycle.
    pub target_pose: Option<Pose>,

    /// Joint configuration sensed this cycle.
    pub config_rad: Option<JointConfig>,

    // VisualServo
    pub visual_servo: visual_servo::VisualServo,
    pub visual_servo_output: Option<visual_servo::OutputData>,
    pub visual_servo_rpt: visual_servo::StatusReport,

    // LimitAvoid
    pub limit_avoid: limit_avoid::LimitAvoid,
    pub limit_avoid_output: Option<limit_avoid::OutputData>,
    pub limit_avoid_rpt: limit_avoid::StatusReport,

    // ManipMax
    pub manip_max: manip_max::ManipMax,
    pub manip_max_output: Option<manip_max::OutputData>,
    pub manip_max_rpt: manip_max::StatusReport,

    // Redundancy
    pub redundancy: redundancy::Redundancy,
    pub redundancy_output: Option<redundancy::OutputData>,
    pub redundancy_rpt: redundancy::StatusReport,

    // Monitoring Counters
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,

    /// Number of consecutive arm demand dispatch errors
    pub num_consec_arm_demand_errors: u64,

    /// Number of cycles with a degenerate task Jacobian this session
    pub num_degenerate_cycles: u64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Puts the executable into safe mode with the given cause.
    pub fn make_safe(&mut self, cause: SafeModeCause) {
        if !self.safe {
            warn!("Make safe requested, cause: {:?}", cause);
            self.safe = true;
            self.safe_cause = Some(cause);
        }
    }

    /// Attempts to disable the safe mode by clearing the given cause.
    ///
    /// Returns `Ok(())` if this cause was cleared and safe mode was disabled, or `Err(())`
    /// otherwise. To remove safe mode the provided cause must match the initial reason for safe
    /// mode being enabled.
    ///
    /// If safe mode was not enabled `Ok(())` is returned
    pub fn make_unsafe(&mut self, cause: SafeModeCause) -> Result<(), ()> {
        if !self.safe {
            return Ok(());
        }

        match self.safe_cause {
            Some(root_cause) => {
                if cause == root_cause {
                    self.safe = false;
                    self.safe_cause = None;
                    info!("Make unsafe requested, root cause match, safe mode disabled");
                    Ok(())
                } else {
                    Err(())
                }
            }
            None => Ok(()),
        }
    }

    /// Perform actions required at the start of a cycle.
    ///
    /// Clears those items that need clearing at the start of a cycle, and sets the 1Hz cycle flag.
    pub fn cycle_start(&mut self, cycle_frequency_hz: f64) {
        if self.num_cycles % (cycle_frequency_hz as u128) == 0 {
            self.is_1_hz_cycle = true;
        } else {
            self.is_1_hz_cycle = false;
        }

        self.target_pose = None;
        self.config_rad = None;

        self.visual_servo_output = None;
        self.visual_servo_rpt = visual_servo::StatusReport::default();

        self.limit_avoid_output = None;
        self.limit_avoid_rpt = limit_avoid::StatusReport::default();

        self.manip_max_output = None;
        self.manip_max_rpt = manip_max::StatusReport::default();

        self.redundancy_output = None;
        self.redundancy_rpt = redundancy::StatusReport::default();

        self.elapsed_s = util::session::get_elapsed_seconds();
    }

    /// Write all module archives for this cycle.
    pub fn write_archives(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.visual_servo.write()?;
        self.limit_avoid.write()?;
        self.manip_max.write()?;
        self.redundancy.write()?;

        Ok(())
    }
}
