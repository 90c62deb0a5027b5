//! Main arm-servoing executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, equipment and all control modules
//!     - Main loop:
//!         - Target pose acquisition from the tracker
//!         - Arm kinematic snapshot (configuration, Jacobians, derivatives)
//!         - Visual servoing (primary task) processing
//!         - Joint limit avoidance processing
//!         - Manipulability maximisation processing
//!         - Redundancy resolution and command dispatch
//!         - Archive and telemetry emission
//!
//! One velocity command is computed and dispatched per cycle. Learn mode
//! (`--learn`) instead stores the first tracked pose as the desired pose and
//! exits.
//!
//! # Modules
//!
//! All control modules (e.g. `visual_servo`) shall meet the following
//! requirements:
//!     1. Provide a public struct implementing the `util::module::State`
//!        trait.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use servo_lib::{
    data_store::{DataStore, SafeModeCause},
    limit_avoid, manip_max,
    params::ExecParams,
    pose_store::PoseStore,
    redundancy,
    tm::{self, TmPacket},
    visual_servo, CYCLE_FREQUENCY_HZ, CYCLE_PERIOD_S,
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, error, info, warn};
use nalgebra::DVector;
use std::env;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use robot_if::eqpt::arm::{Arm, ArmError};
use robot_if::eqpt::tracker::PoseTracker;
use robot_if::pose::PoseVec;
use util::{
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

#[cfg(feature = "sim")]
use robot_if::mock::{MockArm, MockTracker};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of joints of the simulated arm.
#[cfg(feature = "sim")]
const SIM_NUM_JOINTS: usize = 7;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("servo_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Arm Servoing Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- PROCESS CLI ARGUMENTS ----

    let args: Vec<String> = env::args().collect();
    debug!("CLI arguments: {:?}", args);

    let mut learn_mode = false;
    let mut right_arm = false;

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--learn" => learn_mode = true,
            "--rarm" => right_arm = true,
            "--help" => {
                println!("Usage: {} [--learn] [--rarm] [--help]", args[0]);
                return Ok(());
            }
            a => return Err(eyre!("Unrecognised argument \"{}\"", a)),
        }
    }

    let side_suffix = if right_arm { "_r" } else { "_l" };
    info!(
        "Controlling the {} arm\n",
        if right_arm { "right" } else { "left" }
    );

    // ---- LOAD PARAMETERS ----

    let exec_params: ExecParams = util::params::load("servo_exec.toml")
        .wrap_err("Could not load exec params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE EQUIPMENT ----

    #[cfg(feature = "sim")]
    {
        let arm = MockArm::new(SIM_NUM_JOINTS);
        let tracker = MockTracker::fixed(sim_target_pose());
        info!(
            "Simulated equipment initialised ({} joints)",
            SIM_NUM_JOINTS
        );

        run(session, exec_params, learn_mode, side_suffix, arm, tracker)
    }

    #[cfg(not(feature = "sim"))]
    {
        let _ = (exec_params, learn_mode, side_suffix);
        Err(eyre!(
            "No equipment stack configured, rebuild with the `sim` feature \
             or integrate the live robot clients"
        ))
    }
}

/// Run a servoing (or learn) session against the given equipment.
fn run<A: Arm, T: PoseTracker>(
    session: Session,
    exec_params: ExecParams,
    learn_mode: bool,
    side_suffix: &str,
    mut arm: A,
    mut tracker: T,
) -> Result<(), Report> {
    // ---- POSE STORES ----

    let sw_root = host::get_sw_root().map_err(|_| {
        eyre!(
            "The software root environment variable ({}) is not set",
            host::SW_ROOT_ENV_VAR
        )
    })?;

    let mut learned_store = PoseStore::open(sw_root.join("data").join("learned_poses.json"))
        .wrap_err("Could not open the learned pose store")?;
    let learned_name = format!("cdMo{}", side_suffix);

    // ---- LEARN MODE ----

    if learn_mode {
        info!(
            "Learn mode: waiting for a target pose to store as \"{}\"",
            learned_name
        );

        let mut attempts = 0u64;
        let learned = loop {
            match tracker.try_get_pose() {
                Ok(Some(pose)) => break pose,
                Ok(None) => (),
                Err(e) => warn!("Tracker error while learning: {}", e),
            }

            attempts += 1;
            if attempts >= exec_params.learn_timeout_cycles {
                return Err(eyre!(
                    "No target acquired within {} cycles, cannot learn the desired pose",
                    attempts
                ));
            }

            thread::sleep(Duration::from_secs_f64(CYCLE_PERIOD_S));
        };

        learned_store
            .save(&learned_name, &learned)
            .wrap_err("Could not save the learned pose")?;
        info!("Learned pose: {}", PoseVec::from_pose(&learned));

        session.exit();
        return Ok(());
    }

    // ---- LOAD DESIRED POSE AND FIXED TRANSFORM ----

    let desired_pose = learned_store.load(&learned_name).wrap_err(
        "No learned desired pose found, you should first learn it using the --learn option",
    )?;
    info!(
        "Desired pose \"{}\": {}",
        learned_name,
        PoseVec::from_pose(&desired_pose)
    );

    let transform_store = PoseStore::open(sw_root.join("data").join("transforms.json"))
        .wrap_err("Could not open the transform store")?;
    let transform_name = format!("target_M_ee{}", side_suffix);
    let target_m_ee = transform_store
        .load(&transform_name)
        .wrap_err("Missing fixed target to end-effector transform")?;
    info!(
        "Fixed transform \"{}\": {}",
        transform_name,
        PoseVec::from_pose(&target_m_ee)
    );

    // ---- INITIALISE DATASTORE ----

    info!("Initialising modules...");

    let mut ds = DataStore::default();

    let num_joints = arm.num_joints();
    let limits = arm
        .joint_limits()
        .wrap_err("Could not read the joint limits")?;

    info!("Joint limits:");
    for i in 0..num_joints {
        info!(
            "    Joint {}: min = {:.1} deg, max = {:.1} deg",
            i,
            limits.min_rad[i].to_degrees(),
            limits.max_rad[i].to_degrees()
        );
    }

    // ---- INITIALISE MODULES ----

    ds.visual_servo
        .init(
            visual_servo::VisualServoInit {
                params_path: "visual_servo.toml",
                target_m_ee,
                num_joints,
            },
            &session,
        )
        .wrap_err("Failed to initialise VisualServo")?;
    info!("VisualServo init complete");

    ds.limit_avoid
        .init(
            limit_avoid::LimitAvoidInit {
                params_path: "limit_avoid.toml",
                limits: limits.clone(),
            },
            &session,
        )
        .wrap_err("Failed to initialise LimitAvoid")?;
    info!("LimitAvoid init complete");

    ds.manip_max
        .init(
            manip_max::ManipMaxInit {
                params_path: "manip_max.toml",
                num_joints,
            },
            &session,
        )
        .wrap_err("Failed to initialise ManipMax")?;
    info!("ManipMax init complete");

    ds.redundancy
        .init(
            redundancy::RedundancyInit {
                params_path: "redundancy.toml",
                num_joints,
            },
            &session,
        )
        .wrap_err("Failed to initialise Redundancy")?;
    info!("Redundancy init complete");

    info!("Module initialisation complete\n");

    // ---- INITIALISE TELEMETRY ----

    let mut tm_sink = tm::sink_from_name(&exec_params.tm_sink, &exec_params.tm_file_name, &session)
        .wrap_err("Failed to initialise the telemetry sink")?;
    info!("Telemetry sink: {}", exec_params.tm_sink);

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // Clear items that need wiping at the start of the cycle
        ds.cycle_start(CYCLE_FREQUENCY_HZ);

        // ---- DATA INPUT ----

        ds.target_pose = match tracker.try_get_pose() {
            Ok(p) => p,
            Err(e) => {
                warn!("Tracker error, treating target as not found: {}", e);
                None
            }
        };

        if let Some(ref pose) = ds.target_pose {
            debug!("Target pose: {}", PoseVec::from_pose(pose));
        }

        // Sense the arm kinematics as one snapshot for this cycle
        let snapshot = sense_arm(&mut arm);
        let (config_rad, jacobians, derivatives) = match snapshot {
            Ok(s) => {
                ds.make_unsafe(SafeModeCause::ArmNotResponding).ok();
                s
            }
            Err(e) => {
                warn!("Could not sense the arm: {}", e);
                ds.make_safe(SafeModeCause::ArmNotResponding);

                if let Err(e) = arm.stop() {
                    warn!("Could not command stop: {}", e);
                }

                cycle_sleep(&mut ds, cycle_start_instant);
                continue;
            }
        };
        ds.config_rad = Some(config_rad.clone());

        // ---- STOP CHECK ----

        let stop_requested = exec_params.max_session_duration_s > 0.0
            && ds.elapsed_s > exec_params.max_session_duration_s;

        let mut component_failure = false;

        // ---- CONTROL ALGORITHM PROCESSING ----

        // VisualServo processing
        let vs_input = visual_servo::InputData {
            target_pose: ds.target_pose,
            desired_pose,
            ee_jac: jacobians.ee_jac.clone(),
        };
        match ds.visual_servo.proc(&vs_input) {
            Ok((o, r)) => {
                if r.degenerate_jacobian {
                    ds.num_degenerate_cycles += 1;
                    warn!(
                        "Task Jacobian degenerate (cond = {:.1}), using the minimum-norm solution",
                        r.cond
                    );
                }

                ds.visual_servo_output = Some(o);
                ds.visual_servo_rpt = r;
            }
            Err(e @ visual_servo::VisualServoError::JacobianDimMismatch { .. }) => {
                error!("Integration error in VisualServo: {}", e);
                let _ = arm.stop();
                return Err(e).wrap_err("VisualServo dimension mismatch");
            }
            Err(e) => {
                warn!("Error during VisualServo processing: {}", e);
                component_failure = true;
            }
        }

        // LimitAvoid processing
        let la_input = limit_avoid::InputData {
            config_rad: config_rad.clone(),
            q1_rads: ds
                .visual_servo_output
                .as_ref()
                .map(|o| o.q1_rads.clone())
                .unwrap_or_else(|| DVector::zeros(num_joints)),
        };
        match ds.limit_avoid.proc(&la_input) {
            Ok((o, r)) => {
                ds.limit_avoid_output = Some(o);
                ds.limit_avoid_rpt = r;
            }
            Err(e) => {
                error!("Integration error in LimitAvoid: {}", e);
                let _ = arm.stop();
                return Err(e).wrap_err("LimitAvoid dimension mismatch");
            }
        }

        // The nullspace projector is computed once from the primary
        // controller's snapshots and shared by every consumer this cycle
        let projector = match (&ds.visual_servo_output, ds.visual_servo_rpt.target_tracked) {
            (Some(o), true) => Some(redundancy::nullspace_projector(
                &o.task_jac,
                &o.task_jac_pinv,
            )),
            _ => None,
        };

        // ManipMax processing, only meaningful with a live projector
        if let Some(ref p) = projector {
            let mm_input = manip_max::InputData {
                projector: p.clone(),
                jacobian: jacobians.base_jac.clone(),
                derivatives: derivatives.clone(),
            };
            match ds.manip_max.proc(&mm_input) {
                Ok((o, r)) => {
                    ds.manip_max_output = Some(o);
                    ds.manip_max_rpt = r;
                }
                Err(e @ manip_max::ManipMaxError::PseudoInverseFailed(_)) => {
                    warn!("Error during ManipMax processing: {}", e);
                    component_failure = true;
                }
                Err(e) => {
                    error!("Integration error in ManipMax: {}", e);
                    let _ = arm.stop();
                    return Err(e).wrap_err("ManipMax dimension mismatch");
                }
            }
        }

        // Redundancy resolution
        let rd_input = redundancy::InputData {
            time_s: ds.elapsed_s,
            stop_requested,
            target_tracked: ds.target_pose.is_some(),
            component_failure,
            q1_rads: ds.visual_servo_output.as_ref().map(|o| o.q1_rads.clone()),
            err_norm: ds.visual_servo_rpt.err_norm,
            projector,
            q2_rads: ds.limit_avoid_output.as_ref().map(|o| o.q2_rads.clone()),
            q_manip_rads: ds.manip_max_output.as_ref().map(|o| o.q_manip_rads.clone()),
        };
        let (rd_output, rd_rpt) = match ds.redundancy.proc(&rd_input) {
            Ok(x) => x,
            Err(e) => {
                error!("Integration error in Redundancy: {}", e);
                let _ = arm.stop();
                return Err(e).wrap_err("Redundancy resolution failed");
            }
        };
        ds.redundancy_output = Some(rd_output.clone());
        ds.redundancy_rpt = rd_rpt;

        // ---- COMMAND DISPATCH ----

        if ds.safe {
            // While safe only stop demands go to the arm. A successful stop
            // clears the safe mode for the next cycle.
            if arm.stop().is_ok() {
                ds.make_unsafe(SafeModeCause::ArmNotResponding).ok();
            }
        }
        else {
            match arm.set_velocity(&rd_output.dems_rads) {
                Ok(()) => ds.num_consec_arm_demand_errors = 0,
                Err(e) => {
                    warn!("Could not dispatch the velocity demand: {}", e);
                    ds.num_consec_arm_demand_errors += 1;

                    if ds.num_consec_arm_demand_errors > exec_params.max_arm_demand_errors {
                        error!(
                            "Maximum number of consecutive demand errors ({}) exceeded",
                            exec_params.max_arm_demand_errors
                        );
                        let _ = arm.stop();
                        return Err(eyre!("Arm demand channel failed"));
                    }

                    ds.make_safe(SafeModeCause::ArmNotResponding);
                }
            }
        }

        // ---- WRITE ARCHIVES ----

        if let Err(e) = ds.write_archives() {
            warn!("Could not write archives: {}", e);
        }

        // ---- TELEMETRY ----

        let packet = TmPacket::from_datastore(&ds, &limits);
        if let Err(e) = tm_sink.send(&packet) {
            warn!("Telemetry sink error: {}", e);
        }

        if ds.is_1_hz_cycle {
            debug!(
                "Heartbeat: cycle {}, state {:?}, |e| = {:.6}",
                ds.num_cycles, rd_rpt.state, rd_rpt.err_norm
            );
        }

        // ---- SESSION END CHECK ----

        if rd_rpt.state == redundancy::ServoState::Stopped {
            if rd_rpt.converged {
                info!("Servoing converged, session complete");
            }
            else {
                info!("Servoing stopped, session complete");
            }

            // The resolver has already dispatched its final zero command,
            // leave the arm in a commanded stop
            arm.stop().wrap_err("Could not command the final stop")?;
            break;
        }

        // ---- CYCLE MANAGEMENT ----

        cycle_sleep(&mut ds, cycle_start_instant);
    }

    // ---- SHUTDOWN ----

    session.exit();
    info!("End of execution");

    Ok(())
}

/// Read the arm's per-cycle kinematic snapshot.
fn sense_arm<A: Arm>(
    arm: &mut A,
) -> Result<
    (
        robot_if::eqpt::arm::JointConfig,
        robot_if::eqpt::arm::ArmJacobians,
        Vec<nalgebra::DMatrix<f64>>,
    ),
    ArmError,
> {
    let config = arm.configuration()?;
    let jacobians = arm.task_jacobian()?;
    let derivatives = arm.jacobian_derivatives()?;

    Ok((config, jacobians, derivatives))
}

/// Sleep out the remainder of the cycle, accounting for overruns.
fn cycle_sleep(ds: &mut DataStore, cycle_start_instant: Instant) {
    let cycle_dur = Instant::now() - cycle_start_instant;

    match Duration::from_secs_f64(CYCLE_PERIOD_S).checked_sub(cycle_dur) {
        Some(d) => {
            ds.num_consec_cycle_overruns = 0;
            thread::sleep(d);
        }
        None => {
            warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - CYCLE_PERIOD_S
            );
            ds.num_consec_cycle_overruns += 1;
        }
    }

    ds.num_cycles += 1;
}

/// Canned target pose for the simulated tracker, 25 cm in front of the
/// camera.
#[cfg(feature = "sim")]
fn sim_target_pose() -> robot_if::pose::Pose {
    use nalgebra::{Translation3, UnitQuaternion};

    robot_if::pose::Pose::from_parts(
        Translation3::new(0.0, 0.0, 0.25),
        UnitQuaternion::identity(),
    )
}
