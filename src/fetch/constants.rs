//! Constants for the fetch module (timeouts).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle read timeout (60 seconds between body chunks).
pub const READ_TIMEOUT_SECS: u64 = 60;
