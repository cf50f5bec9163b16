/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Pipeline defaults
pub const DEFAULT_PIPE_CAPACITY: usize = 1024;
pub const DEFAULT_SORT_BUFFER_RECORDS: usize = 100_000;

// Spill defaults
pub const DEFAULT_SPILL_DIRECTORY: &str = "./data/spill";
pub const DEFAULT_SPILL_RETENTION_SECS: u64 = 60 * 60;
pub const DEFAULT_SWEEP_ON_STARTUP: bool = true;
pub const DEFAULT_MAX_MERGE_FAN_IN: usize = 64;

// Environment
pub const ENV_PREFIX: &str = "CONDUIT_";
pub const ENV_SEPARATOR: &str = "__";
