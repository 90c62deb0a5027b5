//! Parameters structure for the servoing executable

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the executable itself.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ExecParams {
    // ---- TELEMETRY ----

    /// Telemetry sink selection: "null", "log" or "json_file".
    pub tm_sink: String,

    /// File name for the "json_file" sink, relative to the session
    /// directory.
    pub tm_file_name: String,

    // ---- SESSION ----

    /// Maximum session duration before a cooperative stop is requested.
    /// Zero disables the limit.
    ///
    /// Units: seconds
    pub max_session_duration_s: f64,

    /// Maximum number of consecutive arm demand failures tolerated before
    /// the session is aborted.
    pub max_arm_demand_errors: u64,

    /// Maximum number of cycles to wait for the first target acquisition in
    /// learn mode.
    pub learn_timeout_cycles: u64,
}
