//! # Context Table
//!
//! Per-execution-context reconstruction state. Each context owns the last
//! stack it was sampled with and the spans currently open on it, keyed by
//! depth. Contexts never see each other's stacks, so interleaved concurrent
//! work cannot corrupt another context's nesting.
//!
//! ## Storage
//!
//! Contexts live in an arena of slots addressed by a stable
//! [`ContextHandle`]; a map resolves [`ContextId`]s to handles. A context is
//! created lazily by the first sample that names it and its slot is recycled
//! after teardown.
//!
//! ```text
//! index:  ctx#7 ─► handle 0      slots: [ Some(ctx#7) ]
//!         ctx#9 ─► handle 2              [ None       ]  ◄─ free list
//!                                        [ Some(ctx#9) ]
//! ```
//!
//! Every operation returns the spans it closed, in closing order; the caller
//! forwards them to the span emitter.

use log::debug;
use std::collections::{BTreeMap, HashMap};

use crate::differ::{diff, EventKind, TraceEvent};
use crate::domain::{ContextId, FrameName, SpanId, Timestamp};
use crate::span::{CloseReason, Span};

/// Stable arena index of a live context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(usize);

#[derive(Debug)]
struct ContextState {
    id: ContextId,
    last_stack: Vec<FrameName>,
    open_spans: BTreeMap<usize, Span>,
}

impl ContextState {
    fn new(id: ContextId) -> Self {
        Self { id, last_stack: Vec::new(), open_spans: BTreeMap::new() }
    }
}

/// Bookkeeping counters for a [`ContextTable`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TableStats {
    pub contexts_created: u64,
    pub contexts_torn_down: u64,
    pub spans_opened: u64,
    pub spans_closed: u64,
    /// END events with no matching open span (sampling jitter)
    pub unmatched_ends: u64,
    /// START events deeper than the open stack, which would leave a gap
    pub unmatched_starts: u64,
}

/// Map from execution context to its open spans and last stack.
#[derive(Debug)]
pub struct ContextTable {
    index: HashMap<ContextId, ContextHandle>,
    slots: Vec<Option<ContextState>>,
    free: Vec<usize>,
    next_span_id: u64,
    stats: TableStats,
}

impl Default for ContextTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTable {
    #[must_use]
    pub fn new() -> Self {
        Self { index: HashMap::new(), slots: Vec::new(), free: Vec::new(), next_span_id: 1, stats: TableStats::default() }
    }

    /// Resolve `ctx` to its handle, creating the context on first use.
    pub fn handle(&mut self, ctx: ContextId) -> ContextHandle {
        if let Some(&handle) = self.index.get(&ctx) {
            return handle;
        }

        let state = ContextState::new(ctx);
        let slot = if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(state);
            slot
        } else {
            self.slots.push(Some(state));
            self.slots.len() - 1
        };

        let handle = ContextHandle(slot);
        self.index.insert(ctx, handle);
        self.stats.contexts_created += 1;
        debug!("{ctx} created in slot {slot}");
        handle
    }

    /// Diff `stack` against the context's last stack and apply the result.
    ///
    /// Returns the spans closed by this sample, innermost first.
    pub fn record_sample(&mut self, ctx: ContextId, stack: Vec<FrameName>, timestamp: Timestamp) -> Vec<Span> {
        let handle = self.handle(ctx);
        let events = match self.state(handle) {
            Some(state) => diff(&state.last_stack, &stack, timestamp),
            None => return Vec::new(),
        };

        let closed = self.apply_at(handle, &events);
        if let Some(state) = self.state_mut(handle) {
            state.last_stack = stack;
        }
        closed
    }

    /// Apply already-diffed events to a context.
    ///
    /// START at depth *d* opens a span in slot *d*; END at depth *d* closes the
    /// span in slot *d* if its name matches, and is ignored otherwise. Either
    /// way anything open deeper than *d* is closed first, so open depths stay
    /// contiguous. The context's last stack is rebuilt from the spans left
    /// open, keeping the next sample's diff consistent with them.
    pub fn apply(&mut self, ctx: ContextId, events: &[TraceEvent]) -> Vec<Span> {
        let handle = self.handle(ctx);
        let closed = self.apply_at(handle, events);
        if let Some(state) = self.state_mut(handle) {
            state.last_stack = state.open_spans.values().map(|span| span.name.clone()).collect();
        }
        closed
    }

    /// Force-close every open span of `ctx` at `at` and forget the context.
    ///
    /// Unknown or already torn-down contexts are a no-op.
    pub fn teardown(&mut self, ctx: ContextId, at: Timestamp) -> Vec<Span> {
        self.remove(ctx, at, CloseReason::Teardown)
    }

    /// Tear down every known context (ascending id order).
    pub fn flush_all(&mut self, at: Timestamp) -> Vec<Span> {
        let mut ids: Vec<ContextId> = self.index.keys().copied().collect();
        ids.sort_unstable();

        let mut closed = Vec::new();
        for ctx in ids {
            closed.extend(self.remove(ctx, at, CloseReason::Flush));
        }
        closed
    }

    /// Spans currently open on `ctx`, outermost first.
    #[must_use]
    pub fn open_spans(&self, ctx: ContextId) -> Vec<&Span> {
        self.lookup(ctx).map(|state| state.open_spans.values().collect()).unwrap_or_default()
    }

    /// Last stack recorded for `ctx`.
    #[must_use]
    pub fn last_stack(&self, ctx: ContextId) -> Option<&[FrameName]> {
        self.lookup(ctx).map(|state| state.last_stack.as_slice())
    }

    #[must_use]
    pub fn contains(&self, ctx: ContextId) -> bool {
        self.index.contains_key(&ctx)
    }

    #[must_use]
    pub fn context_count(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn stats(&self) -> TableStats {
        self.stats
    }

    // Private helpers

    fn lookup(&self, ctx: ContextId) -> Option<&ContextState> {
        self.index.get(&ctx).and_then(|&handle| self.state(handle))
    }

    fn state(&self, handle: ContextHandle) -> Option<&ContextState> {
        self.slots.get(handle.0).and_then(Option::as_ref)
    }

    fn state_mut(&mut self, handle: ContextHandle) -> Option<&mut ContextState> {
        self.slots.get_mut(handle.0).and_then(Option::as_mut)
    }

    fn apply_at(&mut self, handle: ContextHandle, events: &[TraceEvent]) -> Vec<Span> {
        let mut closed = Vec::new();
        let mut next_span_id = self.next_span_id;
        let mut stats = self.stats;

        let Some(state) = self.slots.get_mut(handle.0).and_then(Option::as_mut) else {
            return closed;
        };

        for event in events {
            match event.kind {
                EventKind::Start => {
                    if event.depth > state.open_spans.len() {
                        debug!("{}: START {} at depth {} leaves a gap", state.id, event.frame, event.depth);
                        stats.unmatched_starts += 1;
                        continue;
                    }
                    // A depth slot must be closed before it is reopened.
                    if state.open_spans.contains_key(&event.depth) {
                        debug!("{}: START {} over occupied depth {}", state.id, event.frame, event.depth);
                        close_from(&mut state.open_spans, event.depth, event.timestamp, &mut stats, &mut closed);
                    }

                    let parent = event
                        .depth
                        .checked_sub(1)
                        .and_then(|d| state.open_spans.get(&d))
                        .map(|span| span.id);
                    let span = Span::open(
                        SpanId(next_span_id),
                        parent,
                        state.id,
                        event.frame.clone(),
                        event.depth,
                        event.timestamp,
                    );
                    next_span_id += 1;
                    stats.spans_opened += 1;
                    state.open_spans.insert(event.depth, span);
                }
                EventKind::End => {
                    let matches = state.open_spans.get(&event.depth).is_some_and(|span| span.name == event.frame);
                    if matches {
                        close_from(&mut state.open_spans, event.depth, event.timestamp, &mut stats, &mut closed);
                    } else {
                        debug!("{}: unmatched END {} at depth {}", state.id, event.frame, event.depth);
                        stats.unmatched_ends += 1;
                    }
                }
            }
        }

        self.next_span_id = next_span_id;
        self.stats = stats;
        closed
    }

    fn remove(&mut self, ctx: ContextId, at: Timestamp, reason: CloseReason) -> Vec<Span> {
        let Some(handle) = self.index.remove(&ctx) else {
            return Vec::new();
        };
        let Some(state) = self.slots.get_mut(handle.0).and_then(Option::take) else {
            return Vec::new();
        };
        self.free.push(handle.0);
        self.stats.contexts_torn_down += 1;

        let mut closed = Vec::with_capacity(state.open_spans.len());
        for (_, mut span) in state.open_spans.into_iter().rev() {
            span.close(at, reason);
            closed.push(span);
        }
        self.stats.spans_closed += closed.len() as u64;
        debug!("{ctx} removed ({} spans force-closed)", closed.len());
        closed
    }
}

/// Close every span at `depth` and deeper, innermost first.
fn close_from(
    open_spans: &mut BTreeMap<usize, Span>,
    depth: usize,
    at: Timestamp,
    stats: &mut TableStats,
    closed: &mut Vec<Span>,
) {
    let displaced = open_spans.split_off(&depth);
    for (_, mut span) in displaced.into_iter().rev() {
        span.close(at, CloseReason::Sampled);
        stats.spans_closed += 1;
        closed.push(span);
    }
}
