//! Span summary: which frames account for the reconstructed time.
//!
//! Aggregates closed spans by frame name into call counts, total (inclusive)
//! time and self (exclusive) time.
//!
//! # Architecture
//!
//! - **`SummaryStats`** - Streaming aggregation, usable directly as a
//!   [`SpanSink`]
//! - **`summarize_spans()`** - Batch analysis over a finished span list
//!
//! ## Self Time
//!
//! ```text
//! main   ├──────────────────────────┤  total 100
//! fn1       ├──────┤                   total 30
//! fn2                  ├────────┤      total 40
//!                                      main self = 100 - 30 - 40 = 30
//! ```
//!
//! Children always close before their parent in closing order, which is what
//! lets the streaming aggregator settle self time when the parent closes.

// Percentage calculations intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;

use crate::domain::{Duration, ExportError, SpanId};
use crate::emitter::SpanSink;
use crate::span::Span;

// =============================================================================
// SPAN SUMMARY (OUTPUT TYPE)
// =============================================================================

/// Aggregated statistics for one frame name.
///
/// ```text
/// SPANS                     calls    total     self   self%
/// app::handle_request          12  840.00ms  120.00ms  14.3%
/// app::db::query               36  610.00ms  610.00ms  72.6%
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SpanSummary {
    pub name: String,
    /// Number of closed spans with this name
    pub count: u64,
    /// Sum of span durations (children included)
    pub total: Duration,
    /// Sum of span durations minus their direct children's
    pub self_time: Duration,
    /// Longest single span
    pub max: Duration,
    /// Deepest nesting level observed
    pub max_depth: usize,
    /// Share of all self time (0.0 - 100.0)
    pub percentage: f64,
}

#[derive(Debug, Default, Clone)]
struct NameStats {
    count: u64,
    total: u64,
    self_time: u64,
    max: u64,
    max_depth: usize,
}

impl NameStats {
    fn record(&mut self, duration: u64, self_time: u64, depth: usize) {
        self.count += 1;
        self.total += duration;
        self.self_time += self_time;
        self.max = self.max.max(duration);
        self.max_depth = self.max_depth.max(depth);
    }
}

fn to_summaries(names: &HashMap<String, NameStats>) -> Vec<SpanSummary> {
    let all_self: u64 = names.values().map(|s| s.self_time).sum();

    let mut summaries: Vec<SpanSummary> = names
        .iter()
        .map(|(name, stats)| SpanSummary {
            name: name.clone(),
            count: stats.count,
            total: Duration(stats.total),
            self_time: Duration(stats.self_time),
            max: Duration(stats.max),
            max_depth: stats.max_depth,
            percentage: if all_self > 0 { (stats.self_time as f64 / all_self as f64) * 100.0 } else { 0.0 },
        })
        .collect();

    // Most self time first; name breaks ties so output is stable
    summaries.sort_unstable_by(|a, b| b.self_time.cmp(&a.self_time).then_with(|| a.name.cmp(&b.name)));
    summaries
}

// =============================================================================
// SUMMARY STATS (STREAMING AGGREGATOR)
// =============================================================================

/// Streaming span aggregator.
///
/// Expects spans in closing order, the order the engine emits them.
#[derive(Debug, Default)]
pub struct SummaryStats {
    names: HashMap<String, NameStats>,
    /// Child time accumulated for parents that are still open
    pending_child_time: HashMap<SpanId, u64>,
    spans: u64,
}

impl SummaryStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one closed span into the statistics; open spans are ignored.
    pub fn record_span(&mut self, span: &Span) {
        let Some(duration) = span.duration() else {
            return;
        };
        self.spans += 1;

        let child_time = self.pending_child_time.remove(&span.id).unwrap_or(0);
        if let Some(parent) = span.parent {
            *self.pending_child_time.entry(parent).or_insert(0) += duration.0;
        }

        self.names.entry(span.name.to_string()).or_default().record(
            duration.0,
            duration.0.saturating_sub(child_time),
            span.depth,
        );
    }

    /// Number of spans recorded
    #[must_use]
    pub fn span_count(&self) -> u64 {
        self.spans
    }

    /// Current summaries, most self time first
    #[must_use]
    pub fn to_summaries(&self) -> Vec<SpanSummary> {
        to_summaries(&self.names)
    }
}

impl SpanSink for SummaryStats {
    fn on_span_closed(&mut self, span: &Span) -> Result<(), ExportError> {
        self.record_span(span);
        Ok(())
    }
}

/// Summarize a finished list of spans (batch analysis).
///
/// Unlike [`SummaryStats`], input order does not matter.
#[must_use]
pub fn summarize_spans(spans: &[Span]) -> Vec<SpanSummary> {
    let mut child_time: HashMap<SpanId, u64> = HashMap::new();
    for span in spans {
        if let (Some(parent), Some(duration)) = (span.parent, span.duration()) {
            *child_time.entry(parent).or_insert(0) += duration.0;
        }
    }

    let mut names: HashMap<String, NameStats> = HashMap::new();
    for span in spans {
        let Some(duration) = span.duration() else {
            continue;
        };
        let children = child_time.get(&span.id).copied().unwrap_or(0);
        names.entry(span.name.to_string()).or_default().record(
            duration.0,
            duration.0.saturating_sub(children),
            span.depth,
        );
    }

    to_summaries(&names)
}
