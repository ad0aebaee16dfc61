//! Engine configuration surface
//!
//! One plain struct covering everything a host can tune. The CLI builds it
//! from [`crate::cli::Args`]; embedders build it directly.

use std::time::Duration as StdDuration;

use spanscope_common::DEFAULT_SAMPLING_INTERVAL_MS;

use super::errors::ConfigError;
use crate::filter::FrameFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Live sampling interval in milliseconds (must be positive)
    pub interval_ms: u64,
    /// Extra exclusion patterns, checked after the defaults
    pub exclude_patterns: Vec<String>,
    /// Start from [`crate::filter::DEFAULT_EXCLUDE_PATTERNS`]
    pub use_default_excludes: bool,
    /// Allow [`crate::sampler::LiveSampler`] to start
    pub live_sampling: bool,
    /// Let [`crate::annotate::Annotator`] push frames for wrapped handlers
    pub wrap_handlers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
            exclude_patterns: Vec::new(),
            use_default_excludes: true,
            live_sampling: true,
            wrap_handlers: true,
        }
    }
}

impl Config {
    /// Check the configuration without building anything.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidInterval`] for a zero interval and
    /// [`ConfigError::InvalidPattern`] for a pattern that does not compile.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        self.build_filter().map(|_| ())
    }

    /// Sampling interval as a std duration
    #[must_use]
    pub fn interval(&self) -> StdDuration {
        StdDuration::from_millis(self.interval_ms)
    }

    /// Compile the exclusion patterns into a [`FrameFilter`].
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidPattern`] naming the first bad pattern.
    pub fn build_filter(&self) -> Result<FrameFilter, ConfigError> {
        let mut patterns: Vec<&str> = Vec::new();
        if self.use_default_excludes {
            patterns.extend(crate::filter::DEFAULT_EXCLUDE_PATTERNS);
        }
        patterns.extend(self.exclude_patterns.iter().map(String::as_str));
        FrameFilter::new(patterns)
    }
}
