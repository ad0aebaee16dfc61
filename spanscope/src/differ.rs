//! # Stack Differ
//!
//! Infers frame entry/exit from two consecutive stack snapshots of the same
//! execution context, without ever observing the calls themselves.
//!
//! ```text
//! prev: [main, fn1, fn2]        common prefix = [main]
//! curr: [main, fn2, fn1]
//!
//! events @ t:  END fn2 (depth 2)   innermost first
//!              END fn1 (depth 1)
//!              START fn2 (depth 1) outermost first
//!              START fn1 (depth 2)
//! ```
//!
//! Identity is by name at matching depth. Two back-to-back invocations of the
//! same function (including direct recursion that unwinds and re-enters
//! between samples) look like one continuing invocation; sampling cannot tell
//! them apart, and this module does not try to.

use crate::domain::{FrameName, Timestamp};

/// Direction of an inferred frame transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    End,
}

/// One inferred frame transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub kind: EventKind,
    pub timestamp: Timestamp,
    pub frame: FrameName,
    /// Stack index (0 = outermost) the frame occupied
    pub depth: usize,
}

impl TraceEvent {
    #[must_use]
    pub fn start(frame: FrameName, depth: usize, timestamp: Timestamp) -> Self {
        Self { kind: EventKind::Start, timestamp, frame, depth }
    }

    #[must_use]
    pub fn end(frame: FrameName, depth: usize, timestamp: Timestamp) -> Self {
        Self { kind: EventKind::End, timestamp, frame, depth }
    }
}

/// Length of the longest shared leading sequence of two stacks.
#[must_use]
pub fn common_prefix_len(prev: &[FrameName], curr: &[FrameName]) -> usize {
    prev.iter().zip(curr).take_while(|(a, b)| a == b).count()
}

/// Diff two stacks (outer→inner) observed at `timestamp`.
///
/// Emits END events for `prev[common..]` innermost-first, then START events
/// for `curr[common..]` outermost-first. All events share `timestamp`; their
/// order is part of the contract.
#[must_use]
pub fn diff(prev: &[FrameName], curr: &[FrameName], timestamp: Timestamp) -> Vec<TraceEvent> {
    let common = common_prefix_len(prev, curr);
    let mut events = Vec::with_capacity(prev.len() + curr.len() - 2 * common);

    for depth in (common..prev.len()).rev() {
        events.push(TraceEvent::end(prev[depth].clone(), depth, timestamp));
    }
    for (depth, frame) in curr.iter().enumerate().skip(common) {
        events.push(TraceEvent::start(frame.clone(), depth, timestamp));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(names: &[&str]) -> Vec<FrameName> {
        names.iter().copied().map(FrameName::from).collect()
    }

    fn render(events: &[TraceEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e.kind {
                EventKind::Start => format!("START {}@{}", e.frame, e.depth),
                EventKind::End => format!("END {}@{}", e.frame, e.depth),
            })
            .collect()
    }

    #[test]
    fn test_identical_stacks_emit_nothing() {
        let s = stack(&["main", "fn1", "fn2"]);
        assert!(diff(&s, &s, Timestamp(1)).is_empty());
        assert!(diff(&[], &[], Timestamp(1)).is_empty());
    }

    #[test]
    fn test_empty_prev_only_starts() {
        let events = diff(&[], &stack(&["a", "b", "c"]), Timestamp(5));
        assert_eq!(render(&events), vec!["START a@0", "START b@1", "START c@2"]);
        assert!(events.iter().all(|e| e.timestamp == Timestamp(5)));
    }

    #[test]
    fn test_empty_curr_ends_in_full_reverse_order() {
        let events = diff(&stack(&["a", "b", "c"]), &[], Timestamp(5));
        assert_eq!(render(&events), vec!["END c@2", "END b@1", "END a@0"]);
    }

    #[test]
    fn test_swapped_children_reopen_both() {
        let prev = stack(&["main", "fn1", "fn2"]);
        let curr = stack(&["main", "fn2", "fn1"]);
        assert_eq!(common_prefix_len(&prev, &curr), 1);
        assert_eq!(
            render(&diff(&prev, &curr, Timestamp(9))),
            vec!["END fn2@2", "END fn1@1", "START fn2@1", "START fn1@2"]
        );
    }

    #[test]
    fn test_event_counts_and_ordering_for_many_pairs() {
        let pool = ["a", "b", "c", "d"];
        // Every stack over the pool of length <= 3, built from a counter
        let mut stacks = vec![Vec::new()];
        for len in 1..=3u32 {
            for n in 0..4usize.pow(len) {
                let mut s = Vec::new();
                let mut k = n;
                for _ in 0..len {
                    s.push(FrameName::from(pool[k % 4]));
                    k /= 4;
                }
                stacks.push(s);
            }
        }

        for prev in &stacks {
            for curr in &stacks {
                let common = common_prefix_len(prev, curr);
                let events = diff(prev, curr, Timestamp(0));
                let ends: Vec<_> = events.iter().take_while(|e| e.kind == EventKind::End).collect();
                let starts: Vec<_> = events.iter().skip(ends.len()).collect();

                assert_eq!(ends.len(), prev.len() - common);
                assert_eq!(starts.len(), curr.len() - common);
                assert!(starts.iter().all(|e| e.kind == EventKind::Start));
                assert!(ends.windows(2).all(|w| w[0].depth > w[1].depth));
                assert!(starts.windows(2).all(|w| w[0].depth < w[1].depth));
            }
        }
    }

    #[test]
    fn test_recursion_is_conflated() {
        // Same name at same depth reads as one continuing call.
        let prev = stack(&["main", "walk", "walk"]);
        let curr = stack(&["main", "walk", "walk"]);
        assert!(diff(&prev, &curr, Timestamp(3)).is_empty());
    }
}
