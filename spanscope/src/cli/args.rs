//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::domain::Config;

#[derive(Parser, Debug)]
#[command(
    name = "spanscope",
    about = "Reconstruct timed span trees from sampled call-graph profiles",
    after_help = "\
EXAMPLES:
    spanscope app.cpuprofile                         Print a span summary
    spanscope app.cpuprofile --export trace.json     Also write a Chrome trace
    spanscope app.cpuprofile --exclude '^lodash'     Hide extra frames"
)]
pub struct Args {
    /// Call-graph profile to reconstruct (`.cpuprofile` JSON)
    #[arg(value_name = "PROFILE")]
    pub profile: PathBuf,

    /// Export spans as a Chrome trace (Perfetto, chrome://tracing)
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Extra frame exclusion pattern (regex, repeatable, first match wins)
    #[arg(short = 'x', long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Do not apply the built-in runtime frame exclusions
    #[arg(long)]
    pub no_default_excludes: bool,

    /// Number of frames to show in the summary
    #[arg(long, value_name = "N", default_value = "10")]
    pub top: usize,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Engine configuration for a batch run.
    ///
    /// Live sampling and handler wrapping have no meaning for a profile file
    /// and are turned off.
    #[must_use]
    pub fn to_config(&self) -> Config {
        Config {
            exclude_patterns: self.exclude.clone(),
            use_default_excludes: !self.no_default_excludes,
            live_sampling: false,
            wrap_handlers: false,
            ..Config::default()
        }
    }
}
