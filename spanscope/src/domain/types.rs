//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a span id where a
//! context id is expected, and make function signatures more expressive.

use std::fmt;
use std::sync::Arc;

/// Execution context identifier
///
/// Identifies one logical unit of concurrent work (an async task chain, a
/// request, a thread). Every stateful structure in the engine is partitioned
/// by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Span identifier, unique within one engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(pub u64);

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "span#{}", self.0)
    }
}

/// Frame name (cheaply clonable)
///
/// Two frames with the same name at the same depth are the same logical unit
/// for diffing. Equality is by string content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameName(Arc<str>);

impl FrameName {
    /// Create a new frame name
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Get the frame name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FrameName {
    fn from(s: &str) -> Self {
        FrameName::new(s)
    }
}

impl From<String> for FrameName {
    fn from(s: String) -> Self {
        FrameName(Arc::from(s))
    }
}

/// Timestamp in nanoseconds
///
/// Live sampling measures from the sampler's epoch; batch reconstruction
/// measures on the profile's own clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Build a timestamp from microseconds (the `.cpuprofile` unit)
    #[must_use]
    pub fn from_micros(us: u64) -> Self {
        Timestamp(us.saturating_mul(1_000))
    }

    /// Convert to milliseconds (f64)
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_millis(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Time elapsed since `earlier`, zero if `earlier` is later
    #[must_use]
    pub fn since(self, earlier: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}ms", self.as_millis())
    }
}

/// Duration in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(pub u64);

impl Duration {
    /// Convert to microseconds (f64, keeps sub-microsecond precision)
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_micros_f64(self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    /// Convert to milliseconds (f64)
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_millis(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Convert to seconds (f64)
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_seconds(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        Duration(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.as_millis();
        if ms >= 1000.0 {
            write!(f, "{:.2}s", self.as_seconds())
        } else {
            write!(f, "{ms:.2}ms")
        }
    }
}

/// A timestamped snapshot of one execution context's stack (outer→inner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub context: ContextId,
    pub stack: Vec<FrameName>,
}
