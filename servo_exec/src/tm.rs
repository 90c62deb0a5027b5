//! # Telemetry sinks
//!
//! The control loop fills one [`TmPacket`] per cycle with read-only
//! snapshots of the error, gains, corrections and the dispatched command,
//! and hands it to whichever [`TmSink`] the session is configured with. The
//! core owns no plotting or network resources, a sink is free to write the
//! packets to a file, the log, or nowhere at all.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::fs::File;
use std::io::{BufWriter, Write};

use log::debug;
use nalgebra::DVector;
use serde::Serialize;

// Internal
use robot_if::eqpt::arm::JointLimits;
use robot_if::pose::PoseVec;
use util::maths::lin_map;
use util::session::Session;

use crate::data_store::DataStore;
use crate::redundancy::ServoState;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry packet emitted once per control cycle.
#[derive(Debug, Serialize)]
pub struct TmPacket {
    pub time_s: f64,

    pub cycle: u128,

    pub state: ServoState,

    pub safe: bool,

    pub target_tracked: bool,

    pub target_pose: Option<PoseVec>,

    /// Task error vector.
    pub error: Vec<f64>,

    pub err_norm: f64,

    pub lambda: f64,

    /// Condition number of the task Jacobian.
    pub cond: f64,

    pub degenerate_jacobian: bool,

    /// Primary command.
    pub q1_rads: Vec<f64>,

    /// Raw joint limit avoidance correction.
    pub q2_rads: Vec<f64>,

    /// Projected manipulability correction.
    pub q_manip_rads: Vec<f64>,

    /// Combined projected secondary contribution.
    pub q_sec_rads: Vec<f64>,

    /// The dispatched command.
    pub dems_rads: Vec<f64>,

    /// Joint positions normalised to [-1, 1] between their limits.
    pub q_norm: Vec<f64>,

    /// Activation boundaries normalised the same way.
    pub band_lower_inner_norm: Vec<f64>,
    pub band_lower_outer_norm: Vec<f64>,
    pub band_upper_inner_norm: Vec<f64>,
    pub band_upper_outer_norm: Vec<f64>,

    pub converged: bool,
}

/// Sink discarding every packet.
pub struct NullTmSink;

/// Sink emitting packets as debug log lines.
pub struct LogTmSink;

/// Sink appending packets as JSON documents, one per line, to a
/// session-relative file.
pub struct JsonFileTmSink {
    writer: BufWriter<File>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TmSinkError {
    #[error("Unknown telemetry sink \"{0}\"")]
    UnknownSink(String),

    #[error("Could not write telemetry: {0}")]
    WriteError(std::io::Error),

    #[error("Could not serialize the telemetry: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A destination for per-cycle telemetry packets.
pub trait TmSink {
    fn send(&mut self, packet: &TmPacket) -> Result<(), TmSinkError>;
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build the telemetry sink selected by name (`null`, `log` or `json_file`).
pub fn sink_from_name(
    name: &str,
    file_name: &str,
    session: &Session,
) -> Result<Box<dyn TmSink>, TmSinkError> {
    match name {
        "null" => Ok(Box::new(NullTmSink)),
        "log" => Ok(Box::new(LogTmSink)),
        "json_file" => Ok(Box::new(JsonFileTmSink::from_session(session, file_name)?)),
        _ => Err(TmSinkError::UnknownSink(name.to_string())),
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmPacket {
    pub fn from_datastore(ds: &DataStore, limits: &JointLimits) -> Self {
        let vs_out = ds.visual_servo_output.as_ref();
        let la_out = ds.limit_avoid_output.as_ref();
        let mm_out = ds.manip_max_output.as_ref();
        let rd_out = ds.redundancy_output.as_ref();

        let norm = |v: &DVector<f64>| normalise_to_limits(v, limits);

        Self {
            time_s: ds.elapsed_s,
            cycle: ds.num_cycles,
            state: ds.redundancy_rpt.state,
            safe: ds.safe,
            target_tracked: ds.visual_servo_rpt.target_tracked,
            target_pose: ds.target_pose.as_ref().map(PoseVec::from_pose),

            error: vs_out.map(|o| vec_of(&o.error)).unwrap_or_default(),
            err_norm: ds.visual_servo_rpt.err_norm,
            lambda: ds.visual_servo_rpt.lambda,
            cond: ds.visual_servo_rpt.cond,
            degenerate_jacobian: ds.visual_servo_rpt.degenerate_jacobian,

            q1_rads: vs_out.map(|o| vec_of(&o.q1_rads)).unwrap_or_default(),
            q2_rads: la_out.map(|o| vec_of(&o.q2_rads)).unwrap_or_default(),
            q_manip_rads: mm_out.map(|o| vec_of(&o.q_manip_rads)).unwrap_or_default(),
            q_sec_rads: rd_out.map(|o| vec_of(&o.q_sec_rads)).unwrap_or_default(),
            dems_rads: rd_out.map(|o| vec_of(&o.dems_rads)).unwrap_or_default(),

            q_norm: ds.config_rad.as_ref().map(norm).unwrap_or_default(),
            band_lower_inner_norm: la_out
                .map(|o| norm(&o.bands.lower_inner_rad))
                .unwrap_or_default(),
            band_lower_outer_norm: la_out
                .map(|o| norm(&o.bands.lower_outer_rad))
                .unwrap_or_default(),
            band_upper_inner_norm: la_out
                .map(|o| norm(&o.bands.upper_inner_rad))
                .unwrap_or_default(),
            band_upper_outer_norm: la_out
                .map(|o| norm(&o.bands.upper_outer_rad))
                .unwrap_or_default(),

            converged: ds.redundancy_rpt.converged,
        }
    }
}

impl TmSink for NullTmSink {
    fn send(&mut self, _packet: &TmPacket) -> Result<(), TmSinkError> {
        Ok(())
    }
}

impl TmSink for LogTmSink {
    fn send(&mut self, packet: &TmPacket) -> Result<(), TmSinkError> {
        debug!(
            "TM: cycle {} state {:?} |e| {:.6} lambda {:.4} cond {:.2}",
            packet.cycle, packet.state, packet.err_norm, packet.lambda, packet.cond
        );
        Ok(())
    }
}

impl JsonFileTmSink {
    /// Create the telemetry file inside the session directory.
    pub fn from_session(session: &Session, file_name: &str) -> Result<Self, TmSinkError> {
        let mut path = session.session_root.clone();
        path.push(file_name);

        let file = File::create(path).map_err(TmSinkError::WriteError)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl TmSink for JsonFileTmSink {
    fn send(&mut self, packet: &TmPacket) -> Result<(), TmSinkError> {
        serde_json::to_writer(&mut self.writer, packet)
            .map_err(TmSinkError::SerializationError)?;
        self.writer
            .write_all(b"\n")
            .map_err(TmSinkError::WriteError)?;
        self.writer.flush().map_err(TmSinkError::WriteError)?;

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn vec_of(v: &DVector<f64>) -> Vec<f64> {
    v.iter().cloned().collect()
}

/// Normalise per-joint values to [-1, 1] between the joint limits.
fn normalise_to_limits(v: &DVector<f64>, limits: &JointLimits) -> Vec<f64> {
    (0..v.len().min(limits.num_joints()))
        .map(|i| {
            lin_map(
                (limits.min_rad[i], limits.max_rad[i]),
                (-1.0, 1.0),
                v[i],
            )
        })
        .collect()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_packet_from_empty_datastore() {
        let ds = DataStore::default();
        let limits = JointLimits {
            min_rad: DVector::from_element(7, -2.0),
            max_rad: DVector::from_element(7, 2.0),
        };

        let packet = TmPacket::from_datastore(&ds, &limits);

        assert_eq!(packet.cycle, 0);
        assert!(packet.q1_rads.is_empty());
        assert!(packet.dems_rads.is_empty());
        assert!(!packet.converged);

        // An empty packet still serialises cleanly
        let json = serde_json::to_string(&packet).unwrap();
        assert!(json.contains("\"state\":\"Uninit\""));

        NullTmSink.send(&packet).unwrap();
        LogTmSink.send(&packet).unwrap();
    }

    #[test]
    fn test_normalise_to_limits() {
        let limits = JointLimits {
            min_rad: DVector::from_element(3, -2.0),
            max_rad: DVector::from_element(3, 2.0),
        };

        let normed = normalise_to_limits(&DVector::from_vec(vec![-2.0, 0.0, 2.0]), &limits);

        assert!((normed[0] + 1.0).abs() < 1e-12);
        assert!(normed[1].abs() < 1e-12);
        assert!((normed[2] - 1.0).abs() < 1e-12);
    }
}
