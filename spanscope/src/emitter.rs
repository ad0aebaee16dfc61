//! # Span Emitter
//!
//! Hands closed spans to the trace backend exactly once, in closing order.
//!
//! The backend is anything implementing [`SpanSink`]. The emitter does not
//! retry: a failed handoff is counted, logged and reported to the caller, but
//! the span stays closed and bookkeeping is never rolled back.
//!
//! ## Sinks
//!
//! - [`CollectingSink`]: keeps spans in memory behind a shared handle
//! - [`ChannelSink`]: forwards spans over a bounded crossbeam channel
//! - [`crate::export::ChromeTraceExporter`]: writes a Chrome trace file

use crossbeam_channel::{Sender, TrySendError};
use log::warn;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::ExportError;
use crate::span::Span;

/// Receiving end of closed spans (the trace backend's ingestion interface).
pub trait SpanSink: Send {
    /// Accept one closed span.
    ///
    /// # Errors
    /// Returns an [`ExportError`] if the backend could not take the span.
    fn on_span_closed(&mut self, span: &Span) -> Result<(), ExportError>;
}

impl SpanSink for Box<dyn SpanSink> {
    fn on_span_closed(&mut self, span: &Span) -> Result<(), ExportError> {
        (**self).on_span_closed(span)
    }
}

/// Handoff counters for a [`SpanEmitter`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmitterStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Forwards closed spans to a [`SpanSink`].
pub struct SpanEmitter<S> {
    sink: S,
    stats: EmitterStats,
}

impl<S: SpanSink> SpanEmitter<S> {
    pub fn new(sink: S) -> Self {
        Self { sink, stats: EmitterStats::default() }
    }

    /// Hand one closed span to the sink.
    ///
    /// # Errors
    /// Propagates the sink's [`ExportError`]; the span is not retried.
    pub fn on_span_closed(&mut self, span: &Span) -> Result<(), ExportError> {
        debug_assert!(!span.is_open(), "emitting an open span");
        match self.sink.on_span_closed(span) {
            Ok(()) => {
                self.stats.delivered += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!("failed to export {} ({}): {e}", span.id, span.name);
                Err(e)
            }
        }
    }

    /// Hand off a batch in order, continuing past failures.
    ///
    /// # Errors
    /// Returns the first failure after every span has been offered.
    pub fn emit_all(&mut self, spans: &[Span]) -> Result<(), ExportError> {
        let mut first_error = None;
        for span in spans {
            if let Err(e) = self.on_span_closed(span) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    #[must_use]
    pub fn stats(&self) -> EmitterStats {
        self.stats
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume the emitter, returning its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S> std::fmt::Debug for SpanEmitter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanEmitter").field("stats", &self.stats).finish_non_exhaustive()
    }
}

// =============================================================================
// SINKS
// =============================================================================

/// In-memory sink; clones share the same span list.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    spans: Arc<Mutex<Vec<Span>>>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every span received so far, in arrival order.
    #[must_use]
    pub fn spans(&self) -> Vec<Span> {
        self.lock().clone()
    }

    /// Remove and return every span received so far.
    #[must_use]
    pub fn take(&self) -> Vec<Span> {
        std::mem::take(&mut *self.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Span>> {
        // A panic while holding the lock cannot leave a Vec half-written.
        self.spans.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SpanSink for CollectingSink {
    fn on_span_closed(&mut self, span: &Span) -> Result<(), ExportError> {
        self.lock().push(span.clone());
        Ok(())
    }
}

/// Forwards spans to another thread over a bounded channel.
///
/// Sending never blocks the sampling tick: a full channel drops the span and
/// reports [`ExportError::Backpressure`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Span>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: Sender<Span>) -> Self {
        Self { tx }
    }
}

impl SpanSink for ChannelSink {
    fn on_span_closed(&mut self, span: &Span) -> Result<(), ExportError> {
        self.tx.try_send(span.clone()).map_err(|e| match e {
            TrySendError::Full(_) => ExportError::Backpressure,
            TrySendError::Disconnected(_) => ExportError::Disconnected,
        })
    }
}
