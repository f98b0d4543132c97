//! Host platform utility functions

use std::path::PathBuf;

/// Get a short description of the host platform.
pub fn get_platform() -> String {
    format!("{} ({})", std::env::consts::OS, std::env::consts::ARCH)
}

/// Get the software root directory.
///
/// The root is taken from the `TRITON_SW_ROOT` environment variable if it is
/// set, otherwise the current working directory is used.
pub fn get_sw_root() -> PathBuf {
    match std::env::var("TRITON_SW_ROOT") {
        Ok(s) => s.into(),
        Err(_) => PathBuf::from("."),
    }
}
