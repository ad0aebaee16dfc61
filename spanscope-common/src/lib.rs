//! # Shared Data Structures (Profile Producers ↔ Engine)
//!
//! Defines the call-graph profile layout and the constants shared between
//! whatever produces sampled stacks (a JS engine profiler, a recorder, a test
//! fixture) and the `spanscope` reconstruction engine.
//!
//! The layout follows the Chrome DevTools `.cpuprofile` format: a flat list of
//! nodes linked by child id lists, plus parallel `samples` / `timeDeltas`
//! arrays. All times are microseconds.
//!
//! ## Key Types
//!
//! - [`CallGraphProfile`] - The whole batch input
//! - [`ProfileNode`] - One call-graph node (frame + children)
//! - [`CallFrame`] - Frame identity and optional source location
//! - [`NodeId`] - Integer node identifier
//!
//! Enable the `serde` feature to (de)serialize these types.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default live sampling interval in milliseconds (~100 Hz).
pub const DEFAULT_SAMPLING_INTERVAL_MS: u64 = 10;

/// Pseudo frames that stand for "no work" and never become spans.
///
/// `(root)` is the synthetic tree root of a `.cpuprofile`; `(idle)` is the
/// leaf recorded when the sampled thread had nothing to run.
pub const IDLE_FRAME_NAMES: &[&str] = &["(root)", "(idle)"];

/// Name given to frames whose function name is empty.
pub const ANONYMOUS_FRAME_NAME: &str = "(anonymous)";

/// Execution context that batch reconstruction attributes every sample to.
pub const BATCH_CONTEXT_ID: u64 = 0;

/// Returns true if `name` is one of the [`IDLE_FRAME_NAMES`].
#[must_use]
pub fn is_idle_frame(name: &str) -> bool {
    IDLE_FRAME_NAMES.contains(&name)
}

// ============================================================================
// Profile Layout
// ============================================================================

/// Call-graph node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct NodeId(pub u32);

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Frame identity of a call-graph node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase", default)
)]
pub struct CallFrame {
    /// Function name; may be empty for anonymous functions
    pub function_name: String,
    /// Script or module URL, if the producer recorded one
    pub url: String,
    /// Zero-based line number, `-1` when unknown
    pub line_number: i64,
    /// Zero-based column number, `-1` when unknown
    pub column_number: i64,
}

impl CallFrame {
    /// Create a call frame with only a function name.
    pub fn named(function_name: impl Into<String>) -> Self {
        Self { function_name: function_name.into(), url: String::new(), line_number: -1, column_number: -1 }
    }
}

/// A single node of the compressed call graph
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "camelCase"))]
pub struct ProfileNode {
    pub id: NodeId,
    pub call_frame: CallFrame,
    /// Child node ids; absent for leaves
    #[cfg_attr(feature = "serde", serde(default))]
    pub children: Vec<NodeId>,
}

impl ProfileNode {
    /// Create a node with the given frame name and children.
    pub fn new(id: u32, function_name: impl Into<String>, children: &[u32]) -> Self {
        Self {
            id: NodeId(id),
            call_frame: CallFrame::named(function_name),
            children: children.iter().copied().map(NodeId).collect(),
        }
    }

    /// Frame name used for diffing, with empty names mapped to
    /// [`ANONYMOUS_FRAME_NAME`].
    #[must_use]
    pub fn frame_name(&self) -> &str {
        if self.call_frame.function_name.is_empty() {
            ANONYMOUS_FRAME_NAME
        } else {
            &self.call_frame.function_name
        }
    }
}

/// Compressed call-graph profile (batch input)
///
/// `samples[i]` is the leaf node that was executing at tick `i`, and
/// `time_deltas[i]` is the time elapsed since tick `i - 1` (or since
/// `start_time` for the first tick). Both arrays must have equal length.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct CallGraphProfile {
    pub nodes: Vec<ProfileNode>,
    /// Profile start in microseconds
    #[cfg_attr(feature = "serde", serde(default))]
    pub start_time: u64,
    /// Profile end in microseconds, if recorded
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub end_time: Option<u64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub samples: Vec<NodeId>,
    /// Microseconds since the previous sample; real profilers occasionally
    /// record small negative values
    #[cfg_attr(feature = "serde", serde(default))]
    pub time_deltas: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_frames() {
        assert!(is_idle_frame("(root)"));
        assert!(is_idle_frame("(idle)"));
        assert!(!is_idle_frame("(program)"));
        assert!(!is_idle_frame("main"));
    }

    #[test]
    fn test_anonymous_frame_name() {
        let node = ProfileNode::new(7, "", &[]);
        assert_eq!(node.frame_name(), ANONYMOUS_FRAME_NAME);
        let named = ProfileNode::new(8, "handler", &[9]);
        assert_eq!(named.frame_name(), "handler");
        assert_eq!(named.children, vec![NodeId(9)]);
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(3).to_string(), "node#3");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_parse_cpuprofile_layout() {
        let json = r#"{
            "nodes": [
                {"id": 1, "callFrame": {"functionName": "(root)", "url": "", "lineNumber": -1, "columnNumber": -1}, "children": [2]},
                {"id": 2, "callFrame": {"functionName": "main", "scriptId": "12"}, "hitCount": 3}
            ],
            "startTime": 1000,
            "endTime": 5000,
            "samples": [2, 2],
            "timeDeltas": [10, -1]
        }"#;

        let profile: CallGraphProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.nodes.len(), 2);
        assert_eq!(profile.nodes[0].children, vec![NodeId(2)]);
        assert!(profile.nodes[1].children.is_empty());
        assert_eq!(profile.nodes[1].frame_name(), "main");
        assert_eq!(profile.end_time, Some(5000));
        assert_eq!(profile.time_deltas, vec![10, -1]);
    }
}
