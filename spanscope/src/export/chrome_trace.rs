use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;

use spanscope_common::BATCH_CONTEXT_ID;

use crate::domain::{ExportError, Timestamp};
use crate::emitter::SpanSink;
use crate::span::{CloseReason, Span};

/// Chrome Trace Event format
/// Spec: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU/preview
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChromeTraceEvent {
    /// Event name (the span's frame name)
    name: String,
    /// Category for filtering/coloring
    cat: String,
    /// Phase: "X" = complete, "M" = metadata
    ph: String,
    /// Timestamp in microseconds, relative to the earliest span
    ts: f64,
    /// Duration in microseconds (complete events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    dur: Option<f64>,
    /// Process ID
    pid: u32,
    /// Thread ID (the execution context)
    tid: u64,
    /// Optional arguments (metadata)
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<HashMap<String, JsonValue>>,
}

/// Chrome Trace Format container
#[derive(Debug, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeTraceEvent>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: String,
}

/// A closed span waiting to be written.
#[derive(Debug, Clone)]
struct PendingSpan {
    name: String,
    context: u64,
    start: Timestamp,
    end: Timestamp,
    args: HashMap<String, JsonValue>,
}

/// Chrome trace exporter for timeline visualization
///
/// Each execution context becomes one "thread" lane; nesting is recovered by
/// the viewer from the complete events' time ranges.
pub struct ChromeTraceExporter {
    /// Collected spans, in closing order
    spans: Vec<PendingSpan>,
    /// Process id written into every event
    pid: u32,
}

impl Default for ChromeTraceExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChromeTraceExporter {
    /// Create a new Chrome trace exporter
    #[must_use]
    pub fn new() -> Self {
        Self { spans: Vec::new(), pid: 1 }
    }

    /// Set the process id written into the trace
    pub fn set_pid(&mut self, pid: u32) {
        self.pid = pid;
    }

    /// Add a closed span to the trace; open spans are ignored
    pub fn add_span(&mut self, span: &Span) {
        let Some(end) = span.end else {
            return;
        };

        let mut args = HashMap::new();
        args.insert("span_id".to_string(), serde_json::json!(span.id.0));
        if let Some(parent) = span.parent {
            args.insert("parent_id".to_string(), serde_json::json!(parent.0));
        }
        args.insert("depth".to_string(), serde_json::json!(span.depth));
        if let Some(reason) = span.closed_by {
            let reason = match reason {
                CloseReason::Sampled => "sampled",
                CloseReason::Teardown => "teardown",
                CloseReason::Flush => "flush",
            };
            args.insert("closed_by".to_string(), serde_json::json!(reason));
        }

        self.spans.push(PendingSpan {
            name: span.name.to_string(),
            context: span.context.0,
            start: span.start,
            end,
            args,
        });
    }

    /// Export the trace to any writer (file, stdout, buffer, etc.)
    ///
    /// # Example
    /// ```
    /// use spanscope::export::ChromeTraceExporter;
    ///
    /// # fn example() -> Result<(), spanscope::domain::ExportError> {
    /// let exporter = ChromeTraceExporter::new();
    ///
    /// // Write to buffer for testing
    /// let mut buffer = Vec::new();
    /// exporter.export(&mut buffer)?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns [`ExportError::Json`] if serialization or the write fails.
    pub fn export<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let origin = self.spans.iter().map(|s| s.start).min().unwrap_or_default();

        let mut all_events: Vec<ChromeTraceEvent> = self
            .spans
            .iter()
            .map(|span| ChromeTraceEvent {
                name: span.name.clone(),
                cat: "sampled".to_string(),
                ph: "X".to_string(), // Complete
                ts: span.start.since(origin).as_micros_f64(),
                dur: Some(span.end.since(span.start).as_micros_f64()),
                pid: self.pid,
                tid: span.context,
                args: Some(span.args.clone()),
            })
            .collect();

        // Generate thread name metadata events, one per context
        let contexts: BTreeSet<u64> = self.spans.iter().map(|s| s.context).collect();
        for context in contexts {
            let label = if context == BATCH_CONTEXT_ID {
                "Profile".to_string()
            } else {
                format!("Context {context}")
            };
            let mut args = HashMap::new();
            args.insert("name".to_string(), serde_json::json!(label));

            all_events.push(ChromeTraceEvent {
                name: "thread_name".to_string(),
                cat: String::new(),
                ph: "M".to_string(), // Metadata
                ts: 0.0,
                dur: None,
                pid: self.pid,
                tid: context,
                args: Some(args),
            });
        }

        let trace = ChromeTrace { trace_events: all_events, display_time_unit: "ms".to_string() };

        serde_json::to_writer_pretty(writer, &trace)?;
        Ok(())
    }

    /// Get the number of spans collected
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.spans.len()
    }
}

impl SpanSink for ChromeTraceExporter {
    fn on_span_closed(&mut self, span: &Span) -> Result<(), ExportError> {
        self.add_span(span);
        Ok(())
    }
}
