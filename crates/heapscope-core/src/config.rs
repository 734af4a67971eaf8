//! Monitor configuration.
//!
//! Values come from the command line. Transport settings (port, line speed)
//! are not represented here: the reader consumes whatever byte stream it is
//! handed.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Heap size configured on the reference device (`configTOTAL_HEAP_SIZE`).
pub const DEFAULT_TOTAL_HEAP_BYTES: u64 = 128 * 1024;

/// Render/aggregation cadence.
pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(10);

/// Device scheduler tick rate (`configTICK_RATE_HZ`).
pub const DEFAULT_TICK_RATE_HZ: u32 = 100_000;

/// What to do when a cumulative counter goes backwards (device reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegressionPolicy {
    /// Start a fresh, empty series for the new device session.
    #[default]
    NewSession,
    /// Keep appending; the discontinuity is only flagged.
    Continue,
}

impl fmt::Display for RegressionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewSession => write!(f, "new-session"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

impl FromStr for RegressionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new-session" | "new_session" | "reset" => Ok(Self::NewSession),
            "continue" | "keep" => Ok(Self::Continue),
            other => Err(ConfigError::UnknownRegressionPolicy(other.to_string())),
        }
    }
}

/// Everything the aggregator and render loop need to know.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Must match the device's configured heap size for usage % to mean anything.
    pub total_heap_bytes: u64,
    pub render_interval: Duration,
    pub tick_rate_hz: u32,
    pub regression_policy: RegressionPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            total_heap_bytes: DEFAULT_TOTAL_HEAP_BYTES,
            render_interval: DEFAULT_RENDER_INTERVAL,
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            regression_policy: RegressionPolicy::default(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_heap_bytes == 0 {
            return Err(ConfigError::ZeroHeapSize);
        }
        if self.render_interval.is_zero() {
            return Err(ConfigError::ZeroRenderInterval);
        }
        if self.tick_rate_hz == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        Ok(())
    }
}
