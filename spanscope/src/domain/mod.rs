//! Domain model for spanscope
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod config;
pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{ContextId, Duration, FrameName, Sample, SpanId, Timestamp};

pub use config::Config;
pub use errors::{ConfigError, ExportError, ProfileError, RunError, SamplerError};
