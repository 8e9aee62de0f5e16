//! Stable exit codes for router CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config or arguments, or any other error.
pub const INVALID: i32 = 1;
/// The supervisor selected a worker that is not registered.
pub const CONTRACT_VIOLATION: i32 = 2;
