//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! retry engine.

// Retry window bounds
pub const MIN_WINDOW_HOURS: i64 = 24;
pub const MAX_WINDOW_DAYS: i64 = 28;

// Scheduler configuration
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_CONCURRENT_RETRIES: usize = 5;
pub const DEFAULT_JOIN_TIMEOUT_SECS: u64 = 5;

// Built-in failure codes recognized by the policy table
pub const ERROR_FREQCAP: &str = "freqcap";
pub const ERROR_QUOTA: &str = "quota";
pub const ERROR_TEMPLATE_INACTIVE: &str = "template_inactive";

// Attempt bookkeeping
pub const MAX_ERROR_REASON_LENGTH: usize = 256;
