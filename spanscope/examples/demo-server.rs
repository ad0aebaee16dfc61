//! Demo server for spanscope live sampling
//!
//! Simulates a small request-serving process: worker threads pick up
//! requests, each request is its own execution context, and handlers are
//! wrapped with the annotator. The live sampler reconstructs spans from the
//! shadow stacks and the result is written as a Chrome trace.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --example demo-server -- trace.json
//!
//! # Open trace.json in https://ui.perfetto.dev
//! ```

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver};
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use spanscope::annotate::Annotator;
use spanscope::domain::{Config, ContextId};
use spanscope::engine::Engine;
use spanscope::export::ChromeTraceExporter;
use spanscope::probe::TaskRegistry;
use spanscope::sampler::LiveSampler;

const WORKERS: usize = 4;
const REQUESTS: u64 = 40;

fn busy(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}

fn worker(requests: &Receiver<u64>, annotator: &Annotator) {
    while let Ok(request_id) = requests.recv() {
        let ctx = ContextId(request_id);

        let query = annotator.wrap(ctx, "db::query", |rows: u64| busy(2 + rows % 7));
        let render = annotator.wrap(ctx, "view::render", |rows: u64| busy(1 + rows % 3));
        let handle = annotator.wrap(ctx, "handle_request", move |rows: u64| {
            query(rows);
            render(rows);
        });

        handle(request_id * 13);
        annotator.registry().finish(ctx);
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let output = std::env::args().nth(1).unwrap_or_else(|| "trace.json".to_string());

    let config = Config { interval_ms: 1, ..Config::default() };
    let registry = Arc::new(TaskRegistry::new());
    let annotator = Annotator::from_config(&config, (*registry).clone());

    let engine = Engine::from_config(&config, ChromeTraceExporter::new())?;
    let mut sampler = LiveSampler::new(&config, Arc::clone(&registry), engine)?;
    sampler.start()?;

    let (tx, rx) = bounded(REQUESTS as usize);
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let rx = rx.clone();
            let annotator = annotator.clone();
            thread::spawn(move || worker(&rx, &annotator))
        })
        .collect();

    for request_id in 1..=REQUESTS {
        tx.send(request_id).context("Workers exited early")?;
    }
    drop(tx);
    for handle in handles {
        handle.join().map_err(|_| anyhow::anyhow!("worker thread panicked"))?;
    }

    let engine = sampler.into_engine()?;
    let stats = engine.stats();
    let exporter = engine.into_sink();

    let file = File::create(&output).context("Failed to create trace output file")?;
    exporter.export(BufWriter::new(file)).context("Failed to export trace")?;

    println!(
        "{} samples, {} spans, {} unmatched ends; saved: {output}",
        stats.samples,
        exporter.event_count(),
        stats.table.unmatched_ends
    );
    Ok(())
}
