//! Exit codes for the CLI

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Startup run failed
pub const RUN_FAILED: i32 = 3;

/// Run did not finish within the completion timeout
pub const TIMEOUT: i32 = 4;

/// Validation error
pub const VALIDATION_ERROR: i32 = 5;
