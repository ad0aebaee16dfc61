//! # Live Sampler
//!
//! Drives an [`Engine`] from a [`StackProbe`] at a fixed interval.
//!
//! ## Threading
//!
//! The whole pipeline runs on one dedicated worker thread: a
//! `crossbeam_channel::tick` timer and a shutdown channel are multiplexed
//! with `select!`, and the worker owns the engine outright. Hosts only touch
//! the probe.
//!
//! ```text
//! LiveSampler::start ──► spawn "spanscope-sampler"
//!                          loop select! {
//!                            tick     → take_finished → teardown
//!                                       capture       → record_raw
//!                            shutdown → flush_all, return engine
//!                          }
//! LiveSampler::stop  ──► send shutdown, join, keep engine
//! ```
//!
//! Timestamps are nanoseconds since the sampler was created, so spans from
//! several start/stop cycles share one clock.

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration as StdDuration, Instant};

use crate::domain::{Config, ConfigError, Duration, SamplerError, Timestamp};
use crate::emitter::SpanSink;
use crate::engine::Engine;
use crate::probe::StackProbe;

/// Counters for one sampling run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub stacks_captured: u64,
    pub contexts_finished: u64,
    pub export_failures: u64,
}

/// Run one sampling tick against `engine` at `now`.
///
/// Finished contexts are torn down before the new capture so a recycled
/// context id starts from an empty stack.
pub fn sample_once<S: SpanSink, P: StackProbe + ?Sized>(
    engine: &mut Engine<S>,
    probe: &P,
    now: Timestamp,
    stats: &mut TickStats,
) {
    stats.ticks += 1;

    for ctx in probe.take_finished() {
        stats.contexts_finished += 1;
        if engine.teardown(ctx, now).is_err() {
            stats.export_failures += 1;
        }
    }

    for captured in probe.capture() {
        stats.stacks_captured += 1;
        if engine.record_raw(captured.context, &captured.frames, now).is_err() {
            stats.export_failures += 1;
        }
    }
}

struct Worker<S, P: ?Sized> {
    engine: Engine<S>,
    probe: Arc<P>,
    epoch: Instant,
    ticker: Receiver<Instant>,
    shutdown: Receiver<()>,
    stats: TickStats,
}

impl<S: SpanSink, P: StackProbe + ?Sized> Worker<S, P> {
    fn now(&self) -> Timestamp {
        Timestamp(Duration::from(self.epoch.elapsed()).0)
    }

    fn run(mut self) -> (Engine<S>, TickStats) {
        loop {
            select! {
                recv(self.ticker) -> _ => {
                    let now = self.now();
                    sample_once(&mut self.engine, &*self.probe, now, &mut self.stats);
                },
                recv(self.shutdown) -> _ => break,
            }
        }

        let now = self.now();
        if self.engine.flush_all(now).is_err() {
            self.stats.export_failures += 1;
        }
        (self.engine, self.stats)
    }
}

struct Running<S> {
    shutdown: Sender<()>,
    handle: JoinHandle<(Engine<S>, TickStats)>,
}

/// Periodic sampler owning an engine between runs.
pub struct LiveSampler<S, P: ?Sized> {
    interval: StdDuration,
    enabled: bool,
    probe: Arc<P>,
    epoch: Instant,
    /// Present while stopped
    engine: Option<Engine<S>>,
    /// Present while started
    running: Option<Running<S>>,
    last_run: TickStats,
}

impl<S, P> LiveSampler<S, P>
where
    S: SpanSink + 'static,
    P: StackProbe + ?Sized + 'static,
{
    /// Create a stopped sampler.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidInterval`] for a zero interval.
    pub fn new(config: &Config, probe: Arc<P>, engine: Engine<S>) -> Result<Self, ConfigError> {
        if config.interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }

        Ok(Self {
            interval: config.interval(),
            enabled: config.live_sampling,
            probe,
            epoch: Instant::now(),
            engine: Some(engine),
            running: None,
            last_run: TickStats::default(),
        })
    }

    /// Start sampling on a background thread. Starting twice is a no-op.
    ///
    /// # Errors
    /// [`SamplerError::Disabled`] if live sampling is turned off,
    /// [`SamplerError::Spawn`] if the thread could not be created,
    /// [`SamplerError::EngineLost`] if an earlier start failed.
    pub fn start(&mut self) -> Result<(), SamplerError> {
        if self.running.is_some() {
            debug!("sampler already running");
            return Ok(());
        }
        if !self.enabled {
            return Err(SamplerError::Disabled);
        }
        let Some(engine) = self.engine.take() else {
            return Err(SamplerError::EngineLost);
        };

        let (shutdown_tx, shutdown_rx) = bounded(1);
        let worker = Worker {
            engine,
            probe: Arc::clone(&self.probe),
            epoch: self.epoch,
            ticker: tick(self.interval),
            shutdown: shutdown_rx,
            stats: TickStats::default(),
        };

        // A failed spawn drops the worker and the engine with it
        let handle = thread::Builder::new().name("spanscope-sampler".to_string()).spawn(move || worker.run())?;

        info!("sampling every {:?}", self.interval);
        self.running = Some(Running { shutdown: shutdown_tx, handle });
        Ok(())
    }

    /// Stop sampling and flush every open span. Stopping a stopped sampler
    /// is a no-op.
    ///
    /// # Errors
    /// [`SamplerError::WorkerPanicked`] if the worker thread died.
    pub fn stop(&mut self) -> Result<(), SamplerError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        // The worker may already be gone; join reports that
        let _ = running.shutdown.send(());
        let (engine, stats) = running.handle.join().map_err(|_| SamplerError::WorkerPanicked)?;

        info!(
            "sampler stopped after {} ticks ({} stacks, {} contexts finished)",
            stats.ticks, stats.stacks_captured, stats.contexts_finished
        );
        if stats.export_failures > 0 {
            warn!("{} span exports failed while sampling", stats.export_failures);
        }

        self.engine = Some(engine);
        self.last_run = stats;
        Ok(())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The engine, while stopped.
    #[must_use]
    pub fn engine(&self) -> Option<&Engine<S>> {
        self.engine.as_ref()
    }

    /// Counters of the most recent completed run.
    #[must_use]
    pub fn last_run(&self) -> TickStats {
        self.last_run
    }

    /// Stop if needed and hand back the engine.
    ///
    /// # Errors
    /// [`SamplerError::WorkerPanicked`] if the worker thread died,
    /// [`SamplerError::EngineLost`] after a failed start.
    pub fn into_engine(mut self) -> Result<Engine<S>, SamplerError> {
        self.stop()?;
        self.engine.take().ok_or(SamplerError::EngineLost)
    }
}

impl<S, P: ?Sized> Drop for LiveSampler<S, P> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(());
            let _ = running.handle.join();
        }
    }
}

impl<S, P: ?Sized> std::fmt::Debug for LiveSampler<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSampler")
            .field("interval", &self.interval)
            .field("enabled", &self.enabled)
            .field("running", &self.running.is_some())
            .field("last_run", &self.last_run)
            .finish_non_exhaustive()
    }
}
