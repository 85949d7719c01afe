//! Shared helpers.

pub mod fs;

/// Whether the process runs with an effective uid of 0.
#[cfg(unix)]
pub fn running_as_root() -> bool {
    users::get_effective_uid() == 0
}

/// Whether the process runs with an effective uid of 0.
#[cfg(not(unix))]
pub fn running_as_root() -> bool {
    false
}
