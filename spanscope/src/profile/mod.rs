//! Batch input: call-graph profiles
//!
//! Loads `.cpuprofile` style JSON into a [`CallGraphProfile`] and expands it
//! into the per-tick [`crate::domain::Sample`] sequence the engine consumes.

pub mod reconstruct;

pub use reconstruct::{end_of_profile, reconstruct};

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use spanscope_common::CallGraphProfile;

/// Parse a call-graph profile from any reader.
///
/// # Errors
/// Returns the `serde_json` error if the input is not a profile.
pub fn from_reader<R: Read>(reader: R) -> serde_json::Result<CallGraphProfile> {
    serde_json::from_reader(reader)
}

/// Load a call-graph profile from a JSON file.
///
/// Only the shape is checked here; tree validation happens in
/// [`reconstruct`].
///
/// # Errors
/// Fails if the file cannot be opened or does not parse as a profile.
pub fn load_profile(path: impl AsRef<Path>) -> Result<CallGraphProfile> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open profile {}", path.display()))?;
    let profile = from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse profile {}", path.display()))?;

    log::info!(
        "loaded {} ({} nodes, {} samples)",
        path.display(),
        profile.nodes.len(),
        profile.samples.len()
    );
    Ok(profile)
}
