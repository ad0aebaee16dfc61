//! # Reconstruction Engine
//!
//! Owns one complete pipeline: frame filter → stack differ → context table →
//! span emitter. Hosts create as many independent engines as they like; there
//! is no process-wide tracer.
//!
//! ## Entry Points
//!
//! - [`Engine::record_raw`]: raw frame names from a live probe (filtered here)
//! - [`Engine::record_sample`]: an already-filtered [`Sample`]
//! - [`Engine::teardown`]: the host destroyed an execution context
//! - [`Engine::flush_all`]: sampling stopped
//! - [`Engine::run_profile`]: a whole call-graph profile in batch mode
//!
//! Every entry point updates the context table first and only then hands the
//! closed spans to the sink, so an [`ExportError`] never leaves the table in
//! a half-applied state.

use log::{debug, info};

use spanscope_common::CallGraphProfile;

use crate::context::{ContextTable, TableStats};
use crate::domain::{Config, ConfigError, ContextId, ExportError, FrameName, RunError, Sample, Timestamp};
use crate::emitter::{EmitterStats, SpanEmitter, SpanSink};
use crate::filter::FrameFilter;
use crate::profile::{end_of_profile, reconstruct};
use crate::span::Span;

/// Combined counters of one engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub samples: u64,
    pub table: TableStats,
    pub emitter: EmitterStats,
    pub frames_kept: u64,
    pub frames_dropped: u64,
}

/// Outcome of a batch profile run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileRun {
    /// Reconstructed ticks fed through the pipeline
    pub samples: usize,
    /// Time every remaining span was flushed at
    pub ended_at: Timestamp,
}

/// Sampling-to-span reconstruction pipeline.
pub struct Engine<S> {
    filter: FrameFilter,
    table: ContextTable,
    emitter: SpanEmitter<S>,
    samples: u64,
}

impl<S: SpanSink> Engine<S> {
    /// Create an engine with an explicit filter.
    pub fn new(filter: FrameFilter, sink: S) -> Self {
        Self { filter, table: ContextTable::new(), emitter: SpanEmitter::new(sink), samples: 0 }
    }

    /// Create an engine from a validated configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the configuration is invalid.
    pub fn from_config(config: &Config, sink: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config.build_filter()?, sink))
    }

    /// Filter a raw stack (outer→inner) and record it for `ctx`.
    ///
    /// # Errors
    /// Returns the first [`ExportError`] from handing off spans this sample
    /// closed. The sample itself is always recorded.
    pub fn record_raw<I, T>(&mut self, ctx: ContextId, raw_stack: I, timestamp: Timestamp) -> Result<(), ExportError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let stack = self.filter.filter(raw_stack);
        self.record(ctx, stack, timestamp)
    }

    /// Record a sample whose stack has already been filtered.
    ///
    /// # Errors
    /// See [`Engine::record_raw`].
    pub fn record_sample(&mut self, sample: &Sample) -> Result<(), ExportError> {
        self.record(sample.context, sample.stack.clone(), sample.timestamp)
    }

    /// Close every open span of `ctx` at `at` and forget it.
    ///
    /// # Errors
    /// Returns the first [`ExportError`]; the context is gone either way.
    pub fn teardown(&mut self, ctx: ContextId, at: Timestamp) -> Result<(), ExportError> {
        let closed = self.table.teardown(ctx, at);
        if !closed.is_empty() {
            debug!("{ctx} torn down at {at}, closed {} spans", closed.len());
        }
        self.emitter.emit_all(&closed)
    }

    /// Close every open span of every context at `at`.
    ///
    /// # Errors
    /// Returns the first [`ExportError`]; every context is gone either way.
    pub fn flush_all(&mut self, at: Timestamp) -> Result<(), ExportError> {
        let contexts = self.table.context_count();
        let closed = self.table.flush_all(at);
        info!("flushed {contexts} contexts at {at} ({} spans closed)", closed.len());
        self.emitter.emit_all(&closed)
    }

    /// Reconstruct `profile` and push every tick through the pipeline,
    /// then flush at the profile's end.
    ///
    /// Reconstructed stacks go through the frame filter like live ones.
    ///
    /// # Errors
    /// A [`RunError::Profile`] means nothing was recorded. A
    /// [`RunError::Export`] is the first sink failure; the run still
    /// completed.
    pub fn run_profile(&mut self, profile: &CallGraphProfile) -> Result<ProfileRun, RunError> {
        let samples = reconstruct(profile)?;
        let ended_at = end_of_profile(profile, &samples);

        let mut first_error = None;
        for sample in &samples {
            let raw = sample.stack.iter().map(FrameName::as_str);
            if let Err(e) = self.record_raw(sample.context, raw, sample.timestamp) {
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.flush_all(ended_at) {
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(ProfileRun { samples: samples.len(), ended_at }),
        }
    }

    /// Spans currently open on `ctx`, outermost first.
    #[must_use]
    pub fn open_spans(&self, ctx: ContextId) -> Vec<&Span> {
        self.table.open_spans(ctx)
    }

    #[must_use]
    pub fn context_count(&self) -> usize {
        self.table.context_count()
    }

    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let diagnostics = self.filter.diagnostics();
        EngineStats {
            samples: self.samples,
            table: self.table.stats(),
            emitter: self.emitter.stats(),
            frames_kept: diagnostics.frames_kept(),
            frames_dropped: diagnostics.frames_dropped(),
        }
    }

    #[must_use]
    pub fn filter(&self) -> &FrameFilter {
        &self.filter
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        self.emitter.sink()
    }

    /// Consume the engine, returning its sink.
    pub fn into_sink(self) -> S {
        self.emitter.into_sink()
    }

    fn record(&mut self, ctx: ContextId, stack: Vec<FrameName>, timestamp: Timestamp) -> Result<(), ExportError> {
        self.samples += 1;
        let closed = self.table.record_sample(ctx, stack, timestamp);
        self.emitter.emit_all(&closed)
    }
}

impl<S> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("samples", &self.samples)
            .field("table", &self.table)
            .field("emitter", &self.emitter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProfileError;
    use crate::emitter::CollectingSink;
    use crate::span::CloseReason;
    use spanscope_common::ProfileNode;

    struct RejectingSink;

    impl SpanSink for RejectingSink {
        fn on_span_closed(&mut self, _span: &Span) -> Result<(), ExportError> {
            Err(ExportError::Disconnected)
        }
    }

    fn engine() -> (Engine<CollectingSink>, CollectingSink) {
        let sink = CollectingSink::new();
        (Engine::new(FrameFilter::pass_through(), sink.clone()), sink)
    }

    fn names(spans: &[Span]) -> Vec<&str> {
        spans.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_round_trip_produces_nested_spans() {
        let (mut engine, sink) = engine();
        let ctx = ContextId(1);

        engine.record_raw(ctx, ["A"], Timestamp(10)).unwrap();
        engine.record_raw(ctx, ["A", "B"], Timestamp(20)).unwrap();
        engine.record_raw(ctx, ["A"], Timestamp(30)).unwrap();
        engine.record_raw(ctx, Vec::<&str>::new(), Timestamp(40)).unwrap();

        let spans = sink.spans();
        assert_eq!(names(&spans), vec!["B", "A"]);
        let (b, a) = (&spans[0], &spans[1]);
        assert_eq!((b.start, b.end), (Timestamp(20), Some(Timestamp(30))));
        assert_eq!((a.start, a.end), (Timestamp(10), Some(Timestamp(40))));
        assert_eq!(b.parent, Some(a.id));
        assert!(engine.open_spans(ctx).is_empty());
    }

    #[test]
    fn test_default_filter_hides_runtime_frames() {
        let sink = CollectingSink::new();
        let mut engine = Engine::from_config(&Config::default(), sink.clone()).unwrap();
        let ctx = ContextId(3);

        engine.record_raw(ctx, ["app::main", "std::rt::lang_start", "app::handler"], Timestamp(0)).unwrap();
        let open: Vec<&str> = engine.open_spans(ctx).iter().map(|s| s.name.as_str()).collect();
        assert_eq!(open, vec!["app::main", "app::handler"]);
        assert_eq!(engine.stats().frames_dropped, 1);
    }

    #[test]
    fn test_teardown_and_flush_close_everything() {
        let (mut engine, sink) = engine();
        engine.record_raw(ContextId(1), ["a", "b"], Timestamp(0)).unwrap();
        engine.record_raw(ContextId(2), ["c"], Timestamp(0)).unwrap();

        engine.teardown(ContextId(1), Timestamp(5)).unwrap();
        assert_eq!(names(&sink.take()), vec!["b", "a"]);

        engine.flush_all(Timestamp(9)).unwrap();
        let flushed = sink.take();
        assert_eq!(names(&flushed), vec!["c"]);
        assert_eq!(flushed[0].closed_by, Some(CloseReason::Flush));
        assert_eq!(engine.context_count(), 0);
    }

    #[test]
    fn test_export_failure_keeps_bookkeeping() {
        let mut engine = Engine::new(FrameFilter::pass_through(), RejectingSink);
        let ctx = ContextId(1);
        engine.record_raw(ctx, ["a", "b"], Timestamp(0)).unwrap();

        let err = engine.record_raw(ctx, ["a"], Timestamp(1)).unwrap_err();
        assert!(matches!(err, ExportError::Disconnected));

        let open: Vec<&str> = engine.open_spans(ctx).iter().map(|s| s.name.as_str()).collect();
        assert_eq!(open, vec!["a"]);
        assert_eq!(engine.stats().emitter.failed, 1);
        assert_eq!(engine.stats().table.spans_closed, 1);
    }

    #[test]
    fn test_run_profile_flushes_at_end_time() {
        let (mut engine, sink) = engine();
        let profile = CallGraphProfile {
            nodes: vec![
                ProfileNode::new(1, "(root)", &[2]),
                ProfileNode::new(2, "main", &[3, 4]),
                ProfileNode::new(3, "fn1", &[]),
                ProfileNode::new(4, "fn2", &[]),
            ],
            start_time: 0,
            end_time: Some(100),
            samples: vec![3, 4, 3].into_iter().map(spanscope_common::NodeId).collect(),
            time_deltas: vec![10, 10, 10],
        };

        let run = engine.run_profile(&profile).unwrap();
        assert_eq!(run.samples, 3);
        assert_eq!(run.ended_at, Timestamp::from_micros(100));

        let spans = sink.spans();
        assert_eq!(names(&spans), vec!["fn1", "fn2", "fn1", "main"]);
        let main = &spans[3];
        assert_eq!(main.start, Timestamp::from_micros(10));
        assert_eq!(main.end, Some(Timestamp::from_micros(100)));
        assert!(spans[..3].iter().all(|s| s.parent == Some(main.id)));
    }

    #[test]
    fn test_run_profile_rejects_malformed_input() {
        let (mut engine, sink) = engine();
        let profile = CallGraphProfile {
            nodes: vec![ProfileNode::new(1, "(root)", &[])],
            samples: vec![spanscope_common::NodeId(1)],
            ..CallGraphProfile::default()
        };

        let err = engine.run_profile(&profile).unwrap_err();
        assert!(matches!(err, RunError::Profile(ProfileError::LengthMismatch { .. })));
        assert!(sink.is_empty());
        assert_eq!(engine.stats().samples, 0);
    }
}
