//! Reconstructed span records.

use crate::domain::{ContextId, Duration, FrameName, SpanId, Timestamp};

/// Why a span was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// A later sample no longer contained the frame
    Sampled,
    /// The owning context was torn down by the host
    Teardown,
    /// Sampling stopped and every context was flushed
    Flush,
}

/// A reconstructed time interval attributed to one frame.
///
/// Owned by the context table while open; handed to the span emitter once
/// `end` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub id: SpanId,
    /// Span that occupied `depth - 1` in the same context when this one opened
    pub parent: Option<SpanId>,
    pub context: ContextId,
    pub name: FrameName,
    pub depth: usize,
    pub start: Timestamp,
    pub end: Option<Timestamp>,
    pub closed_by: Option<CloseReason>,
}

impl Span {
    pub(crate) fn open(
        id: SpanId,
        parent: Option<SpanId>,
        context: ContextId,
        name: FrameName,
        depth: usize,
        start: Timestamp,
    ) -> Self {
        Self { id, parent, context, name, depth, start, end: None, closed_by: None }
    }

    /// Close the span; an end before the start is clamped to the start.
    pub(crate) fn close(&mut self, at: Timestamp, reason: CloseReason) {
        self.end = Some(at.max(self.start));
        self.closed_by = Some(reason);
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Duration of a closed span; `None` while open
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end.since(self.start))
    }
}
