//! Frame filtering: deciding which frames are noise.
//!
//! Rust statically links its dependencies and JS engines interleave their own
//! pseudo frames with user functions, so a raw stack is mostly runtime
//! machinery. Those frames must be invisible to reconstruction: a dropped
//! frame is removed entirely rather than replaced with a placeholder, so the
//! surviving frames keep contiguous depth numbering.
//!
//! # Filtering Strategy
//!
//! 1. **Name cleanup** - Trim whitespace, demangle raw Rust symbols
//!    (`_ZN5tokio7runtime...E` → `tokio::runtime::...`)
//! 2. **Empty names** - Always dropped
//! 3. **Exclusion patterns** - Ordered regular expressions; the first match
//!    decides, and the decision records which pattern matched
//!
//! The filter must run before the stack differ: removing a frame changes the
//! depth of everything below it, and depth decides which spans stay open.

use log::debug;
use regex::Regex;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::{ConfigError, FrameName};

// =============================================================================
// DEFAULT EXCLUSION TABLE
// =============================================================================

/// Default exclusion patterns targeting runtime and library internals.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    // Standard library
    r"^(std|core|alloc)::",
    // Trait impls on std types: <F as core::future::Future>::poll
    r"^<[^>]* as (std|core|alloc)::",
    // Async runtime crates
    r"^(tokio|async_std|futures|futures_util|futures_core|mio|hyper|hyper_util|tower|tower_service)::",
    // Process entry glue
    r"^(_start|__libc_start_main|__libc_start_call_main|__rust_begin_short_backtrace|__rust_end_short_backtrace)$",
    // JS engine pseudo frames
    r"^\(program\)$",
    r"^\(garbage collector\)$",
    // Node.js internals
    r"^node:internal",
    r"^internal/",
];

// =============================================================================
// FILTER
// =============================================================================

/// Outcome of filtering a single raw frame descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    /// Frame survives under this (cleaned) name
    Keep(FrameName),
    /// Frame matched the exclusion pattern at this index
    Excluded { pattern_index: usize },
    /// Frame name was empty after cleanup
    Empty,
}

/// Ordered set of frame exclusion patterns.
#[derive(Debug)]
pub struct FrameFilter {
    patterns: Vec<Regex>,
    diagnostics: FilterDiagnostics,
}

impl FrameFilter {
    /// Compile an ordered list of exclusion patterns.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidPattern`] for the first pattern that
    /// fails to compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(p).map_err(|source| ConfigError::InvalidPattern { pattern: p.to_owned(), source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns, diagnostics: FilterDiagnostics::default() })
    }

    /// Filter built from [`DEFAULT_EXCLUDE_PATTERNS`].
    #[must_use]
    pub fn with_defaults() -> Self {
        match Self::new(DEFAULT_EXCLUDE_PATTERNS) {
            Ok(filter) => filter,
            // The default table is a compile-time constant covered by tests.
            Err(e) => unreachable!("default exclusion pattern failed to compile: {e}"),
        }
    }

    /// Filter that keeps every non-empty frame.
    #[must_use]
    pub fn pass_through() -> Self {
        Self { patterns: Vec::new(), diagnostics: FilterDiagnostics::default() }
    }

    /// Number of exclusion patterns.
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Source text of the pattern at `index`.
    #[must_use]
    pub fn pattern(&self, index: usize) -> Option<&str> {
        self.patterns.get(index).map(Regex::as_str)
    }

    /// Decide what happens to one raw frame descriptor.
    #[must_use]
    pub fn decide(&self, raw: &str) -> FilterDecision {
        let name = clean_frame_name(raw);
        if name.is_empty() {
            return FilterDecision::Empty;
        }

        match self.patterns.iter().position(|re| re.is_match(&name)) {
            Some(pattern_index) => FilterDecision::Excluded { pattern_index },
            None => FilterDecision::Keep(FrameName::new(name)),
        }
    }

    /// Filter a raw stack (outer→inner) down to its surviving frame names.
    pub fn filter<I, S>(&self, raw_stack: I) -> Vec<FrameName>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kept = Vec::new();
        for raw in raw_stack {
            match self.decide(raw.as_ref()) {
                FilterDecision::Keep(name) => {
                    self.diagnostics.record(true);
                    kept.push(name);
                }
                FilterDecision::Excluded { pattern_index } => {
                    self.diagnostics.record(false);
                    debug!("dropping frame {:?} (pattern #{pattern_index})", raw.as_ref());
                }
                FilterDecision::Empty => self.diagnostics.record(false),
            }
        }
        kept
    }

    /// Kept/dropped counters for this filter.
    #[must_use]
    pub fn diagnostics(&self) -> &FilterDiagnostics {
        &self.diagnostics
    }
}

impl Default for FrameFilter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Trim a raw descriptor and demangle it if it is a mangled Rust symbol.
fn clean_frame_name(raw: &str) -> Cow<'_, str> {
    let trimmed = raw.trim();
    match rustc_demangle::try_demangle(trimmed) {
        // `{:#}` drops the trailing hash (`::h0123abcd...`)
        Ok(demangled) => Cow::Owned(format!("{demangled:#}")),
        Err(_) => Cow::Borrowed(trimmed),
    }
}

// =============================================================================
// FILTER DIAGNOSTICS
// =============================================================================

/// Counts how many frames each filter kept and dropped.
#[derive(Debug, Default)]
pub struct FilterDiagnostics {
    frames_kept: AtomicU64,
    frames_dropped: AtomicU64,
}

impl FilterDiagnostics {
    fn record(&self, kept: bool) {
        if kept {
            self.frames_kept.fetch_add(1, Ordering::Relaxed);
        } else {
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn frames_kept(&self) -> u64 {
        self.frames_kept.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Percentage of frames that were dropped as noise.
    ///
    /// Returns 0.0 if no frames have been filtered yet.
    #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for percentages
    pub fn noise_ratio(&self) -> f64 {
        let kept = self.frames_kept();
        let dropped = self.frames_dropped();
        let total = kept + dropped;
        if total > 0 {
            (dropped as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}
