//! # Profile Reconstruction
//!
//! Expands a compressed call-graph profile back into the linear per-tick
//! sample sequence a live sampler would have produced.
//!
//! ```text
//!  (root)                 samples:    [3, 4, 3, 2]
//!    └─ main (2)          timeDeltas: [5, 5, 5, 5]   (µs)
//!         ├─ fn1 (3)
//!         └─ fn2 (4)      tick 0 @ start+5:  [main, fn1]
//!                         tick 1 @ start+10: [main, fn2]
//!                         ...
//! ```
//!
//! ## Validation
//!
//! The whole call fails with a [`ProfileError`] when the input is not a
//! single-rooted tree, a sample names an unknown node, or the parallel arrays
//! disagree in length. Nothing is emitted for a rejected profile.
//!
//! ## Performance
//!
//! Profiles repeat a small set of leaves many times, so each leaf's stack is
//! resolved once and cached (same idea as a stack-id cache).

use log::debug;
use std::collections::{HashMap, HashSet};

use spanscope_common::{is_idle_frame, CallGraphProfile, NodeId, BATCH_CONTEXT_ID};

use crate::domain::{ContextId, FrameName, ProfileError, Sample, Timestamp};

/// Validated parent-pointer view of a call graph.
struct CallTree<'a> {
    /// Node id → frame name
    names: HashMap<NodeId, &'a str>,
    /// Node id → parent id (absent for the root)
    parents: HashMap<NodeId, NodeId>,
}

impl<'a> CallTree<'a> {
    fn build(profile: &'a CallGraphProfile) -> Result<Self, ProfileError> {
        let mut names = HashMap::with_capacity(profile.nodes.len());
        for node in &profile.nodes {
            if names.insert(node.id, node.frame_name()).is_some() {
                return Err(ProfileError::DuplicateNode(node.id));
            }
        }

        // Every referenced child must exist
        let mut has_parent = HashSet::new();
        for node in &profile.nodes {
            for child in &node.children {
                if !names.contains_key(child) {
                    return Err(ProfileError::UnknownNode(*child));
                }
                has_parent.insert(*child);
            }
        }

        // Exactly one node nobody points at
        let mut roots = profile.nodes.iter().map(|n| n.id).filter(|id| !has_parent.contains(id));
        let root = roots.next().ok_or(ProfileError::MissingRoot)?;
        if let Some(second) = roots.next() {
            return Err(ProfileError::MultipleRoots { first: root, second });
        }

        // Walk down from the root; reaching a node twice means it is not a tree
        let children: HashMap<NodeId, &[NodeId]> =
            profile.nodes.iter().map(|n| (n.id, n.children.as_slice())).collect();
        let mut parents = HashMap::with_capacity(profile.nodes.len());
        let mut visited = HashSet::from([root]);
        let mut pending = vec![root];

        while let Some(id) = pending.pop() {
            for &child in children.get(&id).copied().unwrap_or_default() {
                if !visited.insert(child) {
                    return Err(ProfileError::Cycle(child));
                }
                parents.insert(child, id);
                pending.push(child);
            }
        }

        // Nodes with a parent that the root never reaches form a detached cycle
        if let Some(node) = profile.nodes.iter().find(|n| !visited.contains(&n.id)) {
            return Err(ProfileError::Cycle(node.id));
        }

        Ok(Self { names, parents })
    }

    /// Frame names from the root down to `leaf`, idle pseudo frames removed.
    fn stack_of(&self, leaf: NodeId) -> Result<Vec<FrameName>, ProfileError> {
        if !self.names.contains_key(&leaf) {
            return Err(ProfileError::UnknownNode(leaf));
        }

        let mut stack = Vec::new();
        let mut cursor = Some(leaf);
        while let Some(id) = cursor {
            if let Some(name) = self.names.get(&id).filter(|name| !is_idle_frame(name)) {
                stack.push(FrameName::new(name));
            }
            cursor = self.parents.get(&id).copied();
        }
        stack.reverse();
        Ok(stack)
    }
}

/// Reconstruct the per-tick sample sequence of `profile`.
///
/// Every sample is attributed to the batch context. Negative time deltas
/// add no elapsed time, so timestamps never go backwards.
///
/// # Errors
/// Returns a [`ProfileError`] if the profile is malformed; no partial result
/// is produced.
pub fn reconstruct(profile: &CallGraphProfile) -> Result<Vec<Sample>, ProfileError> {
    if profile.samples.len() != profile.time_deltas.len() {
        return Err(ProfileError::LengthMismatch {
            samples: profile.samples.len(),
            deltas: profile.time_deltas.len(),
        });
    }

    let tree = CallTree::build(profile)?;
    let context = ContextId(BATCH_CONTEXT_ID);

    let mut stack_cache: HashMap<NodeId, Vec<FrameName>> = HashMap::new();
    let mut samples = Vec::with_capacity(profile.samples.len());
    let mut elapsed_us = profile.start_time;

    for (&leaf, &delta) in profile.samples.iter().zip(&profile.time_deltas) {
        if delta < 0 {
            debug!("negative time delta {delta}us before {leaf}, treating as 0");
        }
        elapsed_us = elapsed_us.saturating_add(delta.max(0).unsigned_abs());

        let stack = match stack_cache.get(&leaf) {
            Some(stack) => stack.clone(),
            None => {
                let stack = tree.stack_of(leaf)?;
                stack_cache.insert(leaf, stack.clone());
                stack
            }
        };

        samples.push(Sample { timestamp: Timestamp::from_micros(elapsed_us), context, stack });
    }

    debug!("reconstructed {} samples ({} distinct stacks)", samples.len(), stack_cache.len());
    Ok(samples)
}

/// Time the batch run ends: the recorded `endTime`, else the last sample.
#[must_use]
pub fn end_of_profile(profile: &CallGraphProfile, samples: &[Sample]) -> Timestamp {
    let last = samples.last().map_or(Timestamp::from_micros(profile.start_time), |s| s.timestamp);
    profile.end_time.map_or(last, |end| Timestamp::from_micros(end).max(last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spanscope_common::ProfileNode;

    fn profile(nodes: Vec<ProfileNode>, samples: &[u32], deltas: &[i64]) -> CallGraphProfile {
        CallGraphProfile {
            nodes,
            start_time: 1_000,
            end_time: None,
            samples: samples.iter().copied().map(NodeId).collect(),
            time_deltas: deltas.to_vec(),
        }
    }

    fn simple_tree() -> Vec<ProfileNode> {
        vec![
            ProfileNode::new(1, "(root)", &[2, 5]),
            ProfileNode::new(2, "main", &[3, 4]),
            ProfileNode::new(3, "fn1", &[]),
            ProfileNode::new(4, "fn2", &[]),
            ProfileNode::new(5, "(idle)", &[]),
        ]
    }

    fn names(sample: &Sample) -> Vec<&str> {
        sample.stack.iter().map(FrameName::as_str).collect()
    }

    #[test]
    fn test_reconstructs_outer_to_inner_stacks() {
        let p = profile(simple_tree(), &[3, 4, 2, 5], &[5, 5, 5, 5]);
        let samples = reconstruct(&p).unwrap();

        assert_eq!(samples.len(), 4);
        assert_eq!(names(&samples[0]), vec!["main", "fn1"]);
        assert_eq!(names(&samples[1]), vec!["main", "fn2"]);
        assert_eq!(names(&samples[2]), vec!["main"]);
        assert!(samples[3].stack.is_empty(), "idle leaf must yield an empty stack");

        let times: Vec<u64> = samples.iter().map(|s| s.timestamp.0).collect();
        assert_eq!(times, vec![1_005_000, 1_010_000, 1_015_000, 1_020_000]);
        assert!(samples.iter().all(|s| s.context == ContextId(BATCH_CONTEXT_ID)));
    }

    #[test]
    fn test_reconstruction_is_deterministic() {
        let p = profile(simple_tree(), &[3, 4, 3, 2, 5, 4], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(reconstruct(&p).unwrap(), reconstruct(&p).unwrap());
    }

    #[test]
    fn test_negative_delta_does_not_rewind() {
        let p = profile(simple_tree(), &[3, 4, 3], &[10, -3, 4]);
        let times: Vec<u64> = reconstruct(&p).unwrap().iter().map(|s| s.timestamp.0).collect();
        assert_eq!(times, vec![1_010_000, 1_010_000, 1_014_000]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let p = profile(simple_tree(), &[3, 4], &[1]);
        assert_eq!(reconstruct(&p), Err(ProfileError::LengthMismatch { samples: 2, deltas: 1 }));
    }

    #[test]
    fn test_unknown_sample_node_rejected() {
        let p = profile(simple_tree(), &[3, 99], &[1, 1]);
        assert_eq!(reconstruct(&p), Err(ProfileError::UnknownNode(NodeId(99))));
    }

    #[test]
    fn test_unknown_child_rejected() {
        let nodes = vec![ProfileNode::new(1, "(root)", &[2]), ProfileNode::new(2, "main", &[7])];
        assert_eq!(reconstruct(&profile(nodes, &[], &[])), Err(ProfileError::UnknownNode(NodeId(7))));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let nodes = vec![ProfileNode::new(1, "(root)", &[2]), ProfileNode::new(2, "a", &[]), ProfileNode::new(2, "b", &[])];
        assert_eq!(reconstruct(&profile(nodes, &[], &[])), Err(ProfileError::DuplicateNode(NodeId(2))));
    }

    #[test]
    fn test_multiple_roots_rejected() {
        let nodes = vec![ProfileNode::new(1, "a", &[]), ProfileNode::new(2, "b", &[])];
        assert_eq!(
            reconstruct(&profile(nodes, &[], &[])),
            Err(ProfileError::MultipleRoots { first: NodeId(1), second: NodeId(2) })
        );
    }

    #[test]
    fn test_cycles_rejected() {
        // Whole graph is a cycle: nobody is a root
        let nodes = vec![ProfileNode::new(1, "a", &[2]), ProfileNode::new(2, "b", &[1])];
        assert_eq!(reconstruct(&profile(nodes, &[], &[])), Err(ProfileError::MissingRoot));

        // Detached cycle next to a valid root
        let nodes = vec![
            ProfileNode::new(1, "(root)", &[2]),
            ProfileNode::new(2, "main", &[]),
            ProfileNode::new(3, "x", &[4]),
            ProfileNode::new(4, "y", &[3]),
        ];
        assert_eq!(reconstruct(&profile(nodes, &[2], &[1])), Err(ProfileError::Cycle(NodeId(3))));

        // Shared child reachable twice from the root
        let nodes = vec![
            ProfileNode::new(1, "(root)", &[2, 3]),
            ProfileNode::new(2, "a", &[4]),
            ProfileNode::new(3, "b", &[4]),
            ProfileNode::new(4, "c", &[]),
        ];
        assert!(matches!(reconstruct(&profile(nodes, &[], &[])), Err(ProfileError::Cycle(NodeId(4)))));
    }

    #[test]
    fn test_end_of_profile_prefers_recorded_end() {
        let mut p = profile(simple_tree(), &[3], &[5]);
        let samples = reconstruct(&p).unwrap();
        assert_eq!(end_of_profile(&p, &samples), Timestamp::from_micros(1_005));

        p.end_time = Some(2_000);
        assert_eq!(end_of_profile(&p, &samples), Timestamp::from_micros(2_000));
    }
}
