// Profiler configuration
//
// Loaded from TOML or built from defaults. Every field has a default so a
// config file only needs to name what it changes.

use crate::error::{ProfilerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Frame budget for a 60 Hz target, in milliseconds
pub const DEFAULT_FRAME_BUDGET_MS: f64 = 16.0;

/// How a frame's own `spent_total_ms` is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameTotalMode {
    /// Total time attributed to the boundary invocation: its synchronous body
    /// plus every continuation descended from it
    #[default]
    BoundaryInvocation,
    /// Wall-clock time between two consecutive boundaries
    WallClock,
}

/// Configuration for a [`crate::profiler::Profiler`]
///
/// # Example
/// ```
/// use frametrack::config::{FrameTotalMode, ProfilerConfig};
///
/// let config = ProfilerConfig::from_toml_str("frame_budget_ms = 33.3").unwrap();
/// assert_eq!(config.frame_budget_ms, 33.3);
/// assert_eq!(config.frame_total, FrameTotalMode::BoundaryInvocation);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// A closed frame whose total exceeds this budget counts as a budget
    /// violation in the rolling statistics
    ///
    /// Default: 16.0 ms (60 Hz)
    pub frame_budget_ms: f64,

    /// Source of each frame's `spent_total_ms`
    pub frame_total: FrameTotalMode,

    /// Number of retired invocation summaries kept for inspection
    ///
    /// Default: 256. Zero disables the log.
    pub invocation_log_capacity: usize,

    /// Upper bound on retained closed frames
    ///
    /// `None` (default) keeps every frame for the lifetime of the profiler.
    /// Evicting old frames never affects rolling totals.
    pub max_frame_history: Option<usize>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: DEFAULT_FRAME_BUDGET_MS,
            frame_total: FrameTotalMode::BoundaryInvocation,
            invocation_log_capacity: 256,
            max_frame_history: None,
        }
    }
}

impl ProfilerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ProfilerConfig =
            toml::from_str(content).map_err(|e| ProfilerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.frame_budget_ms.is_finite() || self.frame_budget_ms <= 0.0 {
            return Err(ProfilerError::Config(format!(
                "frame_budget_ms must be a positive number, got {}",
                self.frame_budget_ms
            )));
        }

        if self.max_frame_history == Some(0) {
            return Err(ProfilerError::Config(
                "max_frame_history must be at least 1 when set".to_string(),
            ));
        }

        Ok(())
    }
}
