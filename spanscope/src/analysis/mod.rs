//! Analysis logic for reconstructed spans
//!
//! This module contains pure aggregation logic, separated from the CLI's
//! presentation of it.

pub mod span_summary;

pub use span_summary::{summarize_spans, SpanSummary, SummaryStats};
