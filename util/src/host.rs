//! Host platform (linux for example) utility functions

use std::path::PathBuf;

use uname;

/// Name of the environment variable giving the software root directory.
pub const SW_ROOT_ENV_VAR: &str = "ARM_SERVO_SW_ROOT";

/// Retrieve uname information.
pub fn get_uname() -> std::io::Result<uname::Info> {
    uname::uname()
}

/// Get the software root directory from the `ARM_SERVO_SW_ROOT` environment
/// variable.
///
/// Parameter files, session directories and learned pose data all live under
/// this root.
pub fn get_sw_root() -> Result<PathBuf, std::env::VarError> {
    let root = std::env::var(SW_ROOT_ENV_VAR)?;
    Ok(PathBuf::from(root))
}
