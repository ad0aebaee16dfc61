//! # spanscope - Main Entry Point
//!
//! Batch mode: load a call-graph profile, reconstruct its span tree, print a
//! per-frame summary and optionally write a Chrome trace.
//!
//! ```text
//! PROFILE ──► load ──► Engine::run_profile ──► CollectingSink
//!                                                 ├──► summary (stdout)
//!                                                 └──► --export FILE
//! ```

// Display conversions lose precision on purpose
#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::fs::File;
use std::io::BufWriter;

use spanscope::analysis::{summarize_spans, SpanSummary};
use spanscope::cli::Args;
use spanscope::domain::{ConfigError, ProfileError, RunError};
use spanscope::emitter::CollectingSink;
use spanscope::engine::{Engine, EngineStats};
use spanscope::export::ChromeTraceExporter;
use spanscope::profile::load_profile;
use spanscope::span::Span;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_DATAERR: i32 = 65;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.is::<ConfigError>()) {
        EXIT_USAGE
    } else if err.chain().any(|cause| cause.is::<ProfileError>() || cause.is::<serde_json::Error>()) {
        EXIT_DATAERR
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = args.to_config();

    let profile = load_profile(&args.profile)?;

    let mut engine = Engine::from_config(&config, CollectingSink::new()).context("Invalid configuration")?;
    match engine.run_profile(&profile) {
        Ok(run) => info!("reconstructed {} samples, flushed at {}", run.samples, run.ended_at),
        Err(RunError::Profile(e)) => {
            return Err(e).with_context(|| format!("Cannot reconstruct {}", args.profile.display()));
        }
        // Spans still reached the collector; report and carry on
        Err(RunError::Export(e)) => warn!("some spans were not exported: {e}"),
    }

    let stats = engine.stats();
    let noise = engine.filter().diagnostics().noise_ratio();
    let spans = engine.into_sink().take();

    if !args.quiet {
        print_summary(&summarize_spans(&spans), args.top);
        print_statistics(&stats, noise, spans.len());
    }

    if let Some(ref export_path) = args.export {
        write_trace(&spans, export_path)?;
        if !args.quiet {
            println!("saved: {}", export_path.display());
        }
    }

    Ok(())
}

fn write_trace(spans: &[Span], path: &std::path::Path) -> Result<()> {
    let mut exporter = ChromeTraceExporter::new();
    exporter.set_pid(std::process::id());
    for span in spans {
        exporter.add_span(span);
    }

    let file = File::create(path).context("Failed to create trace output file")?;
    exporter.export(BufWriter::new(file)).context("Failed to export trace")?;
    Ok(())
}

fn print_summary(summaries: &[SpanSummary], top: usize) {
    if summaries.is_empty() {
        println!("no spans reconstructed");
        return;
    }

    let width = summaries.iter().take(top).map(|s| s.name.len()).max().unwrap_or(0).max(5);
    println!("{:<width$}  {:>6}  {:>10}  {:>10}  {:>6}", "SPANS", "calls", "total", "self", "self%");
    for summary in summaries.iter().take(top) {
        println!(
            "{:<width$}  {:>6}  {:>10}  {:>10}  {:>5.1}%",
            summary.name,
            summary.count,
            summary.total.to_string(),
            summary.self_time.to_string(),
            summary.percentage,
        );
    }
    if summaries.len() > top {
        println!("... {} more", summaries.len() - top);
    }
}

fn print_statistics(stats: &EngineStats, noise: f64, spans: usize) {
    let frames = stats.frames_kept + stats.frames_dropped;
    eprintln!(
        "\n{} samples, {} spans, {} frames ({:.1}% filtered), {} unmatched ends",
        stats.samples, spans, frames, noise, stats.table.unmatched_ends
    );
}
