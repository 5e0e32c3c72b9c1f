//! Rate-limit configuration.

use serde::Deserialize;

fn default_max_chars_per_second() -> usize {
    32768
}

fn default_max_errors_per_second() -> u32 {
    400
}

fn default_max_warnings_per_second() -> u32 {
    400
}

/// Per-second output budgets, read from the host's settings store at
/// startup.
///
/// Each budget applies to a rolling one-second window; what exceeds the
/// budget is dropped and summarized with a single overflow notice per
/// window.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeLimits {
    /// Maximum printed characters forwarded per second.
    #[serde(default = "default_max_chars_per_second")]
    pub max_chars_per_second: usize,
    /// Maximum error records forwarded per second.
    #[serde(default = "default_max_errors_per_second")]
    pub max_errors_per_second: u32,
    /// Maximum warning records forwarded per second.
    #[serde(default = "default_max_warnings_per_second")]
    pub max_warnings_per_second: u32,
}

impl Default for ProbeLimits {
    fn default() -> Self {
        Self {
            max_chars_per_second: default_max_chars_per_second(),
            max_errors_per_second: default_max_errors_per_second(),
            max_warnings_per_second: default_max_warnings_per_second(),
        }
    }
}
