//! Structured error types for spanscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use spanscope_common::NodeId;
use thiserror::Error;

/// A call-graph profile that cannot be reconstructed.
///
/// Reconstruction is all-or-nothing: any of these fails the whole call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("invalid profile: {samples} samples but {deltas} time deltas")]
    LengthMismatch { samples: usize, deltas: usize },

    #[error("invalid profile: {0} is referenced but not defined")]
    UnknownNode(NodeId),

    #[error("invalid profile: {0} is defined more than once")]
    DuplicateNode(NodeId),

    #[error("invalid profile: no root node")]
    MissingRoot,

    #[error("invalid profile: multiple root nodes ({first} and {second})")]
    MultipleRoots { first: NodeId, second: NodeId },

    #[error("invalid profile: call graph is not a tree ({0} reached twice)")]
    Cycle(NodeId),
}

/// Failure handing a closed span to a sink.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("span backend is full, span dropped")]
    Backpressure,

    #[error("span backend disconnected")]
    Disconnected,

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Batch run failure: either the profile or the sink was at fault.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("sampling interval must be a positive number of milliseconds")]
    InvalidInterval,

    #[error("invalid frame exclusion pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("live sampling is disabled in the configuration")]
    Disabled,

    #[error("failed to spawn sampler thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("sampler thread panicked")]
    WorkerPanicked,

    #[error("sampler has no engine (an earlier start failed)")]
    EngineLost,
}
